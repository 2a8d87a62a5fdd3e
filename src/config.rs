use crate::{Error, Result};

/// Kernel parameters, addressable by dotted name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
    /// `kernel.hostname`
    pub hostname: String,

    /// `kernel.ostype`
    pub os_type: String,

    /// `kernel.osrelease`
    pub os_release: String,

    /// `kernel.init`, the program run by boot
    pub init: String,

    /// `kernel.tty`, the terminal of the root process
    pub tty: String,

    /// `boot.flagentry`, the path whose presence marks a bootable partition
    pub boot_flag: String,

    /// `fs.specialdir.proc`
    pub proc_dir: String,

    /// `fs.specialdir.dev`
    pub dev_dir: String,

    /// `fs.specialdir.tmp`
    pub tmp_dir: String,

    /// `fs.specialdir.sys`
    pub sys_dir: String,
}

impl Parameters {
    pub const KEYS: [&'static str; 10] = [
        "kernel.hostname",
        "kernel.ostype",
        "kernel.osrelease",
        "kernel.init",
        "kernel.tty",
        "boot.flagentry",
        "fs.specialdir.proc",
        "fs.specialdir.dev",
        "fs.specialdir.tmp",
        "fs.specialdir.sys",
    ];

    pub fn get(&self, key: &str) -> Result<&str> {
        let value = match key {
            "kernel.hostname" => &self.hostname,
            "kernel.ostype" => &self.os_type,
            "kernel.osrelease" => &self.os_release,
            "kernel.init" => &self.init,
            "kernel.tty" => &self.tty,
            "boot.flagentry" => &self.boot_flag,
            "fs.specialdir.proc" => &self.proc_dir,
            "fs.specialdir.dev" => &self.dev_dir,
            "fs.specialdir.tmp" => &self.tmp_dir,
            "fs.specialdir.sys" => &self.sys_dir,
            _ => return Err(Error::InvalidArgument),
        };
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result {
        let slot = match key {
            "kernel.hostname" => &mut self.hostname,
            "kernel.ostype" => &mut self.os_type,
            "kernel.osrelease" => &mut self.os_release,
            "kernel.init" => &mut self.init,
            "kernel.tty" => &mut self.tty,
            "boot.flagentry" => &mut self.boot_flag,
            "fs.specialdir.proc" => &mut self.proc_dir,
            "fs.specialdir.dev" => &mut self.dev_dir,
            "fs.specialdir.tmp" => &mut self.tmp_dir,
            "fs.specialdir.sys" => &mut self.sys_dir,
            _ => return Err(Error::InvalidArgument),
        };
        *slot = value.into();
        Ok(())
    }
}

impl Default for Parameters {
    fn default() -> Parameters {
        Parameters {
            hostname: "localhost".to_owned(),
            os_type: "vkernel".to_owned(),
            os_release: env!("CARGO_PKG_VERSION").to_owned(),
            init: "/sbin/init".to_owned(),
            tty: "/dev/tty1".to_owned(),
            boot_flag: "/dev".to_owned(),
            proc_dir: "/proc".to_owned(),
            dev_dir: "/dev".to_owned(),
            tmp_dir: "/tmp".to_owned(),
            sys_dir: "/sys".to_owned(),
        }
    }
}

/// Node and operating system identity, as returned by `uname`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utsname {
    pub nodename: String,
    pub os_name: String,
    pub os_version: String,
}

impl From<&Parameters> for Utsname {
    fn from(params: &Parameters) -> Utsname {
        Utsname {
            nodename: params.hostname.clone(),
            os_name: params.os_type.clone(),
            os_version: params.os_release.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_round_trips() {
        let mut params = Parameters::default();
        for key in Parameters::KEYS {
            let value = format!("/{key}");
            params.set(key, value.clone()).unwrap();
            assert_eq!(params.get(key).unwrap(), value);
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut params = Parameters::default();
        assert_eq!(params.get("kernel.nope"), Err(Error::InvalidArgument));
        assert_eq!(params.set("kernel.nope", "x"), Err(Error::InvalidArgument));
    }

    #[test]
    fn uname_reflects_parameters() {
        let mut params = Parameters::default();
        params.set("kernel.hostname", "box").unwrap();

        let uname = Utsname::from(&params);
        assert_eq!(uname.nodename, "box");
        assert_eq!(uname.os_name, "vkernel");
        assert_eq!(uname.os_version, env!("CARGO_PKG_VERSION"));
    }
}

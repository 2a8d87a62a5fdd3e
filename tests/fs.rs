use vkernel::{Entry, EntryKind, Error, Filesystem, FilesystemBuilder, Result};

fn is_file(entry: &Entry, contents: &[u8]) -> bool {
    matches!(&entry.kind, EntryKind::RegularFile { data } if data == contents)
}

#[test]
fn created_entries_resolve_with_their_ancestors() -> Result {
    let fs = Filesystem::new();
    let session = fs.session();

    session.create("/a", Entry::directory(0o755))?;
    session.create("/a/b", Entry::directory(0o755))?;
    session.create("/a/b/c", Entry::file(0o644, "c"))?;

    assert!(is_file(&session.get("/a/b/c", true)?, b"c"));
    for ancestor in ["/", "/a", "/a/b"] {
        assert!(session.get(ancestor, true)?.is_directory());
    }

    Ok(())
}

#[test]
fn paths_must_be_absolute_without_trailing_separator() {
    let session = Filesystem::new().session();

    assert_eq!(session.resolve("a", true).unwrap_err(), Error::InvalidArgument);
    assert_eq!(session.resolve("/a/", true).unwrap_err(), Error::InvalidArgument);
    assert_eq!(
        session.create("a", Entry::directory(0o755)),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn create_requires_a_directory_parent() -> Result {
    let fs = FilesystemBuilder::new().file("/file", 0o644, "x")?.build();
    let session = fs.session();

    assert_eq!(
        session.create("/file/child", Entry::directory(0o755)),
        Err(Error::NotADirectory("/file".into()))
    );
    assert_eq!(
        session.create("/missing/child", Entry::directory(0o755)),
        Err(Error::NotFound("/missing".into()))
    );
    assert_eq!(
        session.create("/file", Entry::directory(0o755)),
        Err(Error::AlreadyExists("/file".into()))
    );

    Ok(())
}

#[test]
fn trailing_symlink_through_nested_mounts() -> Result {
    let inner = FilesystemBuilder::new()
        .file("/target", 0o644, "deep")?
        .symlink("/link", "/target")?
        .build();
    let middle = FilesystemBuilder::new()
        .mount("/inner", inner.clone(), 0o755)?
        .build();
    let outer = FilesystemBuilder::new()
        .mount("/middle", middle, 0o755)?
        .build();

    let session = outer.session();

    let followed = session.resolve("/middle/inner/link", true)?;
    assert!(followed.session().filesystem().ptr_eq(&inner));
    assert_eq!(followed.path(), "/target");
    assert!(is_file(&*followed.entry()?, b"deep"));

    let link = session.resolve("/middle/inner/link", false)?;
    assert_eq!(link.path(), "/link");
    assert!(matches!(link.entry()?.kind, EntryKind::SymbolicLink { .. }));

    Ok(())
}

#[test]
fn create_is_delegated_to_the_mounted_filesystem() -> Result {
    let mounted = Filesystem::with_root_mode(0o777, vkernel::Access::ReadWrite);
    let root = FilesystemBuilder::new()
        .mount("/mnt", mounted.clone(), 0o777)?
        .build();
    let session = root.session();

    session.create("/mnt/new", Entry::file(0o644, "n"))?;

    assert!(mounted.paths().contains(&"/new".to_owned()));
    assert!(!root.paths().contains(&"/mnt/new".to_owned()));

    // Existence is checked against the filesystem that owns the parent.
    assert_eq!(
        session.create("/mnt/new", Entry::directory(0o755)),
        Err(Error::AlreadyExists("/mnt/new".into()))
    );

    Ok(())
}

#[test]
fn list_returns_immediate_children_only() -> Result {
    let fs = FilesystemBuilder::new()
        .directory("/etc", 0o755)?
        .file("/etc/hosts", 0o644, "")?
        .directory("/etc/ssh", 0o755)?
        .file("/etc/ssh/config", 0o644, "")?
        .symlink("/conf", "/etc")?
        .build();
    let session = fs.session();

    assert_eq!(session.list("/etc")?, vec!["hosts", "ssh"]);
    assert_eq!(session.list("/conf")?, vec!["hosts", "ssh"]);
    assert_eq!(
        session.list("/etc/hosts"),
        Err(Error::NotADirectory("/etc/hosts".into()))
    );

    Ok(())
}

#[test]
fn list_inside_a_mount() -> Result {
    let mounted = FilesystemBuilder::new().file("/a", 0o644, "")?.build();
    let fs = FilesystemBuilder::new()
        .mount("/mnt", mounted, 0o755)?
        .build();

    assert_eq!(fs.session().list("/mnt")?, vec!["a"]);
    Ok(())
}

#[test]
fn delete_non_empty_directory_needs_recursive() -> Result {
    let fs = FilesystemBuilder::new()
        .directory("/d", 0o755)?
        .directory("/d/sub", 0o755)?
        .file("/d/sub/f", 0o644, "")?
        .build();
    let session = fs.session();

    assert_eq!(session.delete("/d", false), Err(Error::NotEmpty("/d".into())));

    session.delete("/d", true)?;
    assert_eq!(fs.paths(), vec!["/"]);

    Ok(())
}

// Files are removed without any directory check; an alternative contract
// refused them here.
#[test]
fn delete_removes_files_without_a_directory_check() -> Result {
    let fs = FilesystemBuilder::new().file("/f", 0o644, "")?.build();
    let session = fs.session();

    session.delete("/f", false)?;
    assert_eq!(session.resolve("/f", true).unwrap_err(), Error::NotFound("/f".into()));

    Ok(())
}

#[test]
fn delete_removes_the_link_not_its_target() -> Result {
    let fs = FilesystemBuilder::new()
        .file("/target", 0o644, "t")?
        .symlink("/link", "/target")?
        .build();
    let session = fs.session();

    session.delete("/link", false)?;
    assert!(session.resolve("/link", false).is_err());
    assert!(is_file(&session.get("/target", true)?, b"t"));

    Ok(())
}

#[test]
fn session_root_anchors_lookups() -> Result {
    let fs = FilesystemBuilder::new()
        .directory("/jail", 0o755)?
        .directory("/jail/etc", 0o755)?
        .directory("/etc", 0o755)?
        .symlink("/jail/conf", "/etc")?
        .build();

    let jail = fs.session_for(None, "/jail");
    jail.create("/inside", Entry::directory(0o755))?;
    assert!(fs.paths().contains(&"/jail/inside".to_owned()));

    // Absolute link targets stay inside the session root.
    assert_eq!(jail.resolve("/conf", true)?.path(), "/jail/etc");
    assert_eq!(fs.session().resolve("/jail/conf", true)?.path(), "/etc");

    Ok(())
}

#[test]
fn dangling_link_is_not_found() -> Result {
    let fs = FilesystemBuilder::new().symlink("/dangling", "/nowhere")?.build();
    let session = fs.session();

    assert_eq!(
        session.resolve("/dangling", true).unwrap_err(),
        Error::NotFound("/dangling".into())
    );
    assert!(session.resolve("/dangling", false).is_ok());

    Ok(())
}

#[test]
fn read_only_filesystem_rejects_programs() -> Result {
    let procfs = Filesystem::read_only();
    let fs = FilesystemBuilder::new().mount("/proc", procfs, 0o555)?.build();
    let session = fs.session();

    assert_eq!(
        session.create("/proc/1", Entry::directory(0o555)),
        Err(Error::PermissionDenied)
    );
    assert_eq!(session.list("/proc")?, Vec::<String>::new());

    Ok(())
}

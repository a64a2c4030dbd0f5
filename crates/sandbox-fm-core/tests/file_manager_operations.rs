use sandbox_fm_core::{
    CancellationToken, ConflictPolicy, FileManager, FileManagerConfig, FileManagerError, HashAlgorithm, RenameError,
    RenameSpec, SearchCriteria, batch, no_progress,
};
use std::path::Path;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const PNG_HEADER: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

async fn manager_with(dir: &Path, config: FileManagerConfig) -> FileManager {
    assert_ok!(FileManager::builder().root(dir).config(config).build().await)
}

async fn manager(dir: &Path) -> FileManager {
    manager_with(dir, FileManagerConfig::default()).await
}

/// Checksums of an empty file are the well-known empty-input digests
#[tokio::test]
async fn test_empty_file_checksums() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager(temp_dir.path()).await;
    assert_ok!(manager.create_file("empty.txt", "", ConflictPolicy::Reject).await);

    let sums = assert_ok!(
        manager
            .checksum("empty.txt", &[HashAlgorithm::Md5, HashAlgorithm::Sha256])
            .await
    );
    assert_eq!(sums.size_bytes(), 0);
    assert_eq!(sums.get(HashAlgorithm::Md5), Some("d41d8cd98f00b204e9800998ecf8427e"));
    assert_eq!(
        sums.get(HashAlgorithm::Sha256),
        Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
    );
    assert_eq!(sums.get(HashAlgorithm::Sha1), None);
    assert_eq!(
        sums.verify("D41D8CD98F00B204E9800998ECF8427E "),
        Some(HashAlgorithm::Md5)
    );
}

/// Sequential preview keeps extensions and commit applies exactly the preview
#[tokio::test]
async fn test_sequential_batch_rename_preview_and_commit() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager(temp_dir.path()).await;
    for name in ["beach.jpg", "city.jpg", "forest.jpg"] {
        assert_ok!(manager.create_file(name, name, ConflictPolicy::Reject).await);
    }
    let files: Vec<_> = ["beach.jpg", "city.jpg", "forest.jpg"]
        .iter()
        .map(|n| manager.root().join(n))
        .collect();

    let spec = RenameSpec::Sequential {
        pattern: "File_{n}".to_string(),
        start_number: 1,
    };
    let names = assert_ok!(batch::preview(&files, &spec));
    assert_eq!(names, vec!["File_0001.jpg", "File_0002.jpg", "File_0003.jpg"]);

    let outcome = assert_ok!(manager.commit_batch_rename(&files, &names, no_progress()).await);
    let listed: Vec<_> = outcome.listing.iter().map(|e| e.name.clone()).collect();
    assert_eq!(listed, names);
    assert_eq!(
        std::fs::read_to_string(manager.root().join("File_0002.jpg")).unwrap(),
        "city.jpg"
    );
}

#[tokio::test]
async fn test_batch_rename_stale_preview_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager(temp_dir.path()).await;
    assert_ok!(manager.create_file("a.txt", "a", ConflictPolicy::Reject).await);
    assert_ok!(manager.create_file("b.txt", "b", ConflictPolicy::Reject).await);
    let files = vec![manager.root().join("a.txt"), manager.root().join("b.txt")];

    let err = assert_err!(
        manager
            .commit_batch_rename(&files, &["only-one.txt".to_string()], no_progress())
            .await
    );
    assert!(matches!(
        err,
        FileManagerError::Rename(RenameError::LengthMismatch { files: 2, preview: 1 })
    ));

    // b.txt already exists and is not being renamed
    let err = assert_err!(
        manager
            .commit_batch_rename(&files[..1], &["b.txt".to_string()], no_progress())
            .await
    );
    assert!(matches!(err, FileManagerError::Rename(RenameError::Collision { index: 0, .. })));
    assert!(manager.root().join("a.txt").exists());
}

/// Content search skips binary files even when their bytes contain the query
#[tokio::test]
async fn test_content_search_ignores_binary_files() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager(temp_dir.path()).await;
    assert_ok!(
        manager
            .create_file("notes.txt", "remember: TODO call the bank", ConflictPolicy::Reject)
            .await
    );
    let mut png = PNG_HEADER.to_vec();
    png.extend_from_slice(b"TODO");
    assert_ok!(manager.create_file("image.png", png, ConflictPolicy::Reject).await);

    let results = assert_ok!(
        manager
            .search(SearchCriteria::new("TODO").search_content(true), CancellationToken::new())
            .await
    );
    assert_eq!(results, vec![manager.root().join("notes.txt")]);
}

#[tokio::test]
async fn test_search_respects_result_cap() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with(
        temp_dir.path(),
        FileManagerConfig {
            search_result_cap: 3,
            ..FileManagerConfig::default()
        },
    )
    .await;
    for i in 0..5 {
        assert_ok!(
            manager
                .create_file(&format!("log-{i}.txt"), "x", ConflictPolicy::Reject)
                .await
        );
    }

    let results = assert_ok!(
        manager
            .search(SearchCriteria::new("log"), CancellationToken::new())
            .await
    );
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_cancelled_search() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager(temp_dir.path()).await;
    assert_ok!(manager.create_file("a.txt", "x", ConflictPolicy::Reject).await);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = assert_err!(manager.search(SearchCriteria::new("a"), cancel).await);
    assert!(matches!(err, FileManagerError::Cancelled { .. }));
}

/// Nothing resolves outside the root, no matter how it is spelled
#[tokio::test]
async fn test_operations_stay_inside_root() {
    let outer = TempDir::new().unwrap();
    let root = outer.path().join("sandbox");
    std::fs::write(outer.path().join("secret.txt"), "outside").unwrap();
    let manager = manager(&root).await;

    assert!(assert_err!(manager.resolve("../secret.txt")).is_outside_root());
    assert!(assert_err!(manager.delete("../secret.txt").await).is_outside_root());
    assert!(assert_err!(manager.navigate_to("..").await).is_outside_root());
    assert!(assert_err!(manager.resolve(outer.path().join("secret.txt"))).is_outside_root());
    assert!(matches!(
        assert_err!(manager.rename("../secret.txt", "mine.txt").await),
        FileManagerError::Path(_)
    ));
    assert!(outer.path().join("secret.txt").exists());

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(outer.path(), root.join("escape")).unwrap();
        assert!(assert_err!(manager.resolve("escape/secret.txt")).is_outside_root());
    }
}

#[tokio::test]
async fn test_move_copy_and_delete_follow_current_directory() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager(temp_dir.path()).await;
    assert_ok!(manager.create_directory("inbox", ConflictPolicy::Reject).await);
    assert_ok!(manager.create_directory("archive", ConflictPolicy::Reject).await);
    assert_ok!(manager.navigate_to("inbox").await);
    assert_ok!(manager.create_file("mail.eml", "hello", ConflictPolicy::Reject).await);

    // Copy into archive twice: the second copy is auto-renamed
    assert_ok!(manager.copy_item("inbox/mail.eml", "archive", ConflictPolicy::Rename).await);
    let second = assert_ok!(manager.copy_item("inbox/mail.eml", "archive", ConflictPolicy::Rename).await);
    assert_eq!(second.path, Some(manager.root().join("archive/mail 2.eml")));

    // Moving onto an occupied name is rejected by default
    let err = assert_err!(manager.move_item("inbox/mail.eml", "archive", ConflictPolicy::Reject).await);
    assert!(matches!(err, FileManagerError::Conflict { .. }));

    // Moving the directory we are in carries the current directory along
    assert_ok!(manager.move_item("inbox", "archive", ConflictPolicy::Reject).await);
    assert_eq!(manager.current_directory().await, manager.root().join("archive/inbox"));

    // Deleting it moves us up to the surviving parent
    let outcome = assert_ok!(manager.delete("archive/inbox").await);
    assert_eq!(manager.current_directory().await, manager.root().join("archive"));
    let names: Vec<_> = outcome.listing.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["mail 2.eml", "mail.eml"]);

    let err = assert_err!(manager.delete(manager.root().to_path_buf()).await);
    assert!(matches!(err, FileManagerError::InvalidOperation { .. }));
}

#[tokio::test]
async fn test_import_from_outside() {
    let outer = TempDir::new().unwrap();
    let external = outer.path().join("download.pdf");
    std::fs::write(&external, b"%PDF-1.7").unwrap();
    let manager = manager(&outer.path().join("sandbox")).await;

    let first = assert_ok!(manager.import_from(&external, ConflictPolicy::Rename).await);
    assert_eq!(first.path, Some(manager.root().join("download.pdf")));
    let second = assert_ok!(manager.import_from(&external, ConflictPolicy::Rename).await);
    assert_eq!(second.path, Some(manager.root().join("download 2.pdf")));
    let skipped = assert_ok!(manager.import_from(&external, ConflictPolicy::Skip).await);
    assert_eq!(skipped.path, None);
    assert!(external.exists(), "import copies, it never moves");

    let err = assert_err!(
        manager
            .import_from(outer.path().join("missing.bin"), ConflictPolicy::Rename)
            .await
    );
    assert!(matches!(err, FileManagerError::NotFound { .. }));
}

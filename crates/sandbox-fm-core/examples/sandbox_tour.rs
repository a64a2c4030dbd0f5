//! A walk through the file manager: browse, mutate, checksum, search,
//! archive and batch-rename inside a throwaway sandbox.
//
//! NOTE: This example prints to stdout for demonstration purposes.
#![allow(clippy::print_stdout)]

use sandbox_fm_core::{
    CancellationToken, ConflictPolicy, FileManager, HashAlgorithm, RenameSpec, SearchCriteria, UnpackRequest, batch,
    no_progress, progress_channel,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = std::env::temp_dir().join("sandbox_fm_tour");
    let manager = FileManager::builder().root(&root).build().await?;
    println!("Sandbox root: {}", manager.root().display());
    println!();

    // === CREATE AND BROWSE ===
    manager.create_directory("photos", ConflictPolicy::Rename).await?;
    manager
        .create_file("notes.txt", "TODO: sort the holiday photos", ConflictPolicy::Rename)
        .await?;
    for name in ["IMG_104.jpg", "IMG_105.jpg", "IMG_106.jpg"] {
        manager.navigate_to("photos").await?;
        manager.create_file(name, name.as_bytes(), ConflictPolicy::Rename).await?;
        manager.navigate_up().await;
    }

    for entry in manager.list_current().await? {
        let kind = if entry.is_directory { "dir " } else { "file" };
        println!("{kind} {:<16} {:?}", entry.name, entry.category);
    }
    println!();

    // === DUPLICATE AND CHECKSUM ===
    let copy = manager.duplicate("notes.txt").await?;
    println!("Duplicated notes.txt -> {:?}", copy.path);
    let sums = manager
        .checksum("notes.txt", &[HashAlgorithm::Md5, HashAlgorithm::Sha256])
        .await?;
    for (algorithm, digest) in sums.iter() {
        println!("{algorithm:<7} {digest}");
    }
    println!();

    // === SEARCH ===
    let hits = manager
        .search(SearchCriteria::new("todo").search_content(true), CancellationToken::new())
        .await?;
    println!("Files mentioning TODO: {hits:?}");
    println!();

    // === BATCH RENAME ===
    let files: Vec<_> = ["IMG_104.jpg", "IMG_105.jpg", "IMG_106.jpg"]
        .iter()
        .map(|n| manager.root().join("photos").join(n))
        .collect();
    let spec = RenameSpec::Sequential {
        pattern: "Holiday_{n}".to_string(),
        start_number: 1,
    };
    let names = batch::preview(&files, &spec)?;
    println!("Preview: {names:?}");
    manager.commit_batch_rename(&files, &names, no_progress()).await?;
    println!();

    // === ARCHIVES ===
    let (progress, mut rx) = progress_channel();
    let printer = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let fraction = *rx.borrow_and_update();
            println!("  packing {:>3.0}%", fraction * 100.0);
            if fraction >= 1.0 {
                break;
            }
        }
    });
    let packed = manager
        .pack(&["photos", "notes.txt"], "holiday", None, progress, CancellationToken::new())
        .await?;
    printer.await?;
    println!("Packed into {:?}", packed.path);

    let request = UnpackRequest {
        destination: Some("restored".into()),
        delete_archive_on_success: true,
        ..UnpackRequest::default()
    };
    manager
        .unpack("holiday.zip", request, no_progress(), CancellationToken::new())
        .await?;
    for entry in manager.list_directory("restored/photos").await? {
        println!("restored/photos/{}", entry.name);
    }

    tokio::fs::remove_dir_all(&root).await?;
    Ok(())
}

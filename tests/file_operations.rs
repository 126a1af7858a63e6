mod common;

use vibe_editor_lib::BackendError;

fn path_str(path: &std::path::Path) -> String {
    path.display().to_string()
}

#[tokio::test]
async fn write_creates_missing_ancestors() {
    let dir = tempfile::tempdir().unwrap();
    let backend = common::backend(&dir).await;

    let file = dir.path().join("a/b/c.txt");
    backend.write_file(&path_str(&file), "deep").await.unwrap();

    assert!(dir.path().join("a").is_dir());
    assert!(dir.path().join("a/b").is_dir());
    assert_eq!(backend.read_file(&path_str(&file)).await.unwrap(), "deep");
}

#[tokio::test]
async fn listing_puts_directories_first() {
    let dir = tempfile::tempdir().unwrap();
    let backend = common::backend(&dir).await;
    let root = dir.path().join("project");

    for file in ["zeta.rs", "Alpha.md", "beta.txt"] {
        backend
            .write_file(&path_str(&root.join(file)), "")
            .await
            .unwrap();
    }
    for sub in ["src", "Docs"] {
        backend
            .create_directory(&path_str(&root.join(sub)))
            .await
            .unwrap();
    }

    let entries = backend.list_directory(&path_str(&root)).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Docs", "src", "Alpha.md", "beta.txt", "zeta.rs"]);

    assert!(entries[0].is_directory);
    let rust = entries.iter().find(|e| e.name == "zeta.rs").unwrap();
    assert_eq!(rust.extension.as_deref(), Some(".rs"));
    assert_eq!(rust.size, Some(0));
}

#[tokio::test]
async fn copy_and_move_create_destination_parents() {
    let dir = tempfile::tempdir().unwrap();
    let backend = common::backend(&dir).await;

    let src = dir.path().join("src.txt");
    backend.write_file(&path_str(&src), "payload").await.unwrap();

    let copied = dir.path().join("new/dir/copy.txt");
    backend
        .copy_path(&path_str(&src), &path_str(&copied))
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&copied).unwrap(), "payload");
    assert!(src.exists());

    let moved = dir.path().join("other/dir/moved.txt");
    backend
        .move_path(&path_str(&src), &path_str(&moved))
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&moved).unwrap(), "payload");
    assert!(!src.exists());
}

#[tokio::test]
async fn copy_directory_is_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let backend = common::backend(&dir).await;

    let tree = dir.path().join("tree");
    backend
        .write_file(&path_str(&tree.join("one/two/leaf.txt")), "leaf")
        .await
        .unwrap();

    let target = dir.path().join("clone");
    backend
        .copy_path(&path_str(&tree), &path_str(&target))
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(target.join("one/two/leaf.txt")).unwrap(),
        "leaf"
    );
}

#[tokio::test]
async fn delete_and_exists() {
    let dir = tempfile::tempdir().unwrap();
    let backend = common::backend(&dir).await;

    let tree = dir.path().join("gone");
    backend
        .write_file(&path_str(&tree.join("inner/file.txt")), "x")
        .await
        .unwrap();
    assert!(backend.path_exists(&path_str(&tree)).await);

    backend.delete_path(&path_str(&tree)).await.unwrap();
    assert!(!backend.path_exists(&path_str(&tree)).await);

    let err = backend.delete_path(&path_str(&tree)).await.unwrap_err();
    match err {
        BackendError::File(file_err) => {
            assert_eq!(file_err.operation(), "delete");
            assert_eq!(file_err.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn read_error_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let backend = common::backend(&dir).await;

    let missing = dir.path().join("nope.txt");
    let message: String = backend
        .read_file(&path_str(&missing))
        .await
        .unwrap_err()
        .into();
    assert!(message.contains("nope.txt"));
}

use super::*;
use pretty_assertions::assert_eq;
use std::io::Cursor;
use tenftp::auth::DefaultUser;

fn fixture() -> (tempfile::TempDir, Filesystem) {
    let root = tempfile::TempDir::new().unwrap();
    let fs = Filesystem::new(root.path());
    (root, fs)
}

#[tokio::test]
async fn put_then_stat_sizes_agree() {
    let (_root, fs) = fixture();
    let payload = b"hello atomic world".to_vec();

    let written = fs.put(&DefaultUser, Cursor::new(payload.clone()), "hello.txt", 0).await.unwrap();
    assert_eq!(written, payload.len() as u64);

    let meta = fs.metadata(&DefaultUser, "hello.txt").await.unwrap();
    assert!(meta.is_file());
    assert_eq!(meta.len(), payload.len() as u64);
}

#[tokio::test]
async fn put_leaves_no_temp_artifacts(){
    let (root, fs) = fixture();
    fs.put(&DefaultUser, Cursor::new(b"data".to_vec()), "a/b/file.bin", 0).await.unwrap();

    let mut leftovers = Vec::new();
    for entry in walkdir(root.path()) {
        if entry.to_string_lossy().ends_with(".tmp") {
            leftovers.push(entry);
        }
    }
    assert_eq!(leftovers, Vec::<std::path::PathBuf>::new());
}

fn walkdir(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            out.push(path);
        }
    }
    out
}

#[tokio::test]
async fn get_honours_offsets() {
    let (_root, fs) = fixture();
    fs.put(&DefaultUser, Cursor::new(b"0123456789".to_vec()), "digits", 0).await.unwrap();

    let mut reader = fs.get(&DefaultUser, "digits", 4).await.unwrap();
    let mut out = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut out).await.unwrap();
    assert_eq!(out, "456789");
}

#[tokio::test]
async fn read_only_refuses_every_mutation() {
    let (_root, fs) = fixture();
    fs.put(&DefaultUser, Cursor::new(b"x".to_vec()), "existing", 0).await.unwrap();
    let fs = fs.read_only(true);

    let put = fs.put(&DefaultUser, Cursor::new(b"y".to_vec()), "f", 0).await.unwrap_err();
    assert_eq!(put.kind(), ErrorKind::ReadOnlyStorage);
    assert_eq!(fs.mkd(&DefaultUser, "d").await.unwrap_err().kind(), ErrorKind::ReadOnlyStorage);
    assert_eq!(fs.del(&DefaultUser, "existing").await.unwrap_err().kind(), ErrorKind::ReadOnlyStorage);
    assert_eq!(fs.rmd(&DefaultUser, "d").await.unwrap_err().kind(), ErrorKind::ReadOnlyStorage);
    assert_eq!(
        fs.rename(&DefaultUser, "existing", "elsewhere").await.unwrap_err().kind(),
        ErrorKind::ReadOnlyStorage
    );
    // Reads still work.
    assert!(fs.metadata(&DefaultUser, "existing").await.is_ok());
}

#[tokio::test]
async fn max_file_size_caps_streams() {
    let (root, fs) = fixture();
    let fs = fs.max_file_size(8);

    assert!(fs.put(&DefaultUser, Cursor::new(vec![0u8; 8]), "fits", 0).await.is_ok());

    let err = fs.put(&DefaultUser, Cursor::new(vec![0u8; 9]), "too-big", 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExceededStorageAllocationError);
    // The oversized upload never materialises, not even partially.
    assert!(!root.path().join("too-big").exists());
    assert!(!root.path().join("too-big.tmp").exists());
}

#[tokio::test]
async fn full_path_clamps_escapes() {
    let (root, fs) = fixture();
    std::fs::write(root.path().join("inside.txt"), b"in").unwrap();

    // A path that tries to climb out resolves inside the base.
    let meta = fs.metadata(&DefaultUser, "../../inside.txt").await.unwrap();
    assert!(meta.is_file());

    let clamped = fs.full_path("../../../etc/passwd");
    assert!(clamped.starts_with(root.path()));
}

#[tokio::test]
async fn rename_moves_the_payload() {
    let (_root, fs) = fixture();
    fs.put(&DefaultUser, Cursor::new(b"payload".to_vec()), "old-name", 0).await.unwrap();
    fs.mkd(&DefaultUser, "dir").await.unwrap();

    fs.rename(&DefaultUser, "old-name", "dir/new-name").await.unwrap();

    assert!(fs.metadata(&DefaultUser, "old-name").await.is_err());
    let meta = fs.metadata(&DefaultUser, "dir/new-name").await.unwrap();
    assert_eq!(meta.len(), 7);

    let missing = fs.rename(&DefaultUser, "never-existed", "x").await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::PermanentFileNotAvailable);
}

#[tokio::test]
async fn empty_directories_stat_and_list() {
    let (_root, fs) = fixture();
    fs.mkd(&DefaultUser, "docs").await.unwrap();

    let meta = fs.metadata(&DefaultUser, "docs").await.unwrap();
    assert!(meta.is_dir());
    assert_eq!(fs.list(&DefaultUser, "docs").await.unwrap().len(), 0);
    assert!(fs.cwd(&DefaultUser, "docs").await.is_ok());

    fs.rmd(&DefaultUser, "docs").await.unwrap();
    assert!(fs.metadata(&DefaultUser, "docs").await.is_err());
}

#[tokio::test]
async fn rmd_refuses_non_empty_directories() {
    let (_root, fs) = fixture();
    fs.mkd(&DefaultUser, "full").await.unwrap();
    fs.put(&DefaultUser, Cursor::new(b"x".to_vec()), "full/file", 0).await.unwrap();
    assert!(fs.rmd(&DefaultUser, "full").await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn configured_modes_are_applied() {
    use std::os::unix::fs::PermissionsExt;

    let (root, fs) = fixture();
    let fs = fs.file_mode(0o600).dir_mode(0o700);

    fs.put(&DefaultUser, Cursor::new(b"x".to_vec()), "private", 0).await.unwrap();
    fs.mkd(&DefaultUser, "vault").await.unwrap();

    let file_mode = std::fs::metadata(root.path().join("private")).unwrap().permissions().mode() & 0o777;
    let dir_mode = std::fs::metadata(root.path().join("vault")).unwrap().permissions().mode() & 0o777;
    assert_eq!(file_mode, 0o600);
    assert_eq!(dir_mode, 0o700);
}

#[tokio::test]
async fn listing_renders_names_and_sizes() {
    let (_root, fs) = fixture();
    fs.put(&DefaultUser, Cursor::new(b"abc".to_vec()), "f1", 0).await.unwrap();
    fs.mkd(&DefaultUser, "d1").await.unwrap();

    let listing = fs.list(&DefaultUser, ".").await.unwrap();
    assert_eq!(listing.len(), 2);
    let f1 = listing.iter().find(|fi| fi.path.as_path() == std::path::Path::new("f1")).unwrap();
    assert_eq!(f1.metadata.len(), 3);
    let rendered = f1.to_string();
    assert!(rendered.ends_with("f1"), "unexpected listing line: {}", rendered);
}

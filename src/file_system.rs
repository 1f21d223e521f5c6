// src/file_system.rs
// Atomic file writes shared by the checkpoint store and the engine's output
// writer.

use std::path::Path;

use tokio::io::AsyncWriteExt;

/// Write a file ensuring parent directories exist, using a temp-file + rename
/// strategy so a crash mid-write never leaves a partially written destination.
pub async fn write_atomic<P: AsRef<Path>>(
    path: P,
    bytes: impl AsRef<[u8]>,
) -> std::io::Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Temp file in the same directory so the rename stays on one filesystem.
    let temp_path = {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        let mut tmp = path.to_path_buf();
        let suffix = format!("tmp.{}.{}", pid, ts);
        let new_ext = match path.extension().and_then(|e| e.to_str()) {
            Some(orig) => format!("{}.{}", orig, suffix),
            None => suffix,
        };
        tmp.set_extension(new_ext);
        tmp
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await?;

    if let Err(e) = async {
        file.write_all(bytes.as_ref()).await?;
        file.sync_all().await
    }
    .await
    {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    drop(file);

    // On Windows, rename won't overwrite an existing destination.
    #[cfg(windows)]
    {
        if path.exists() {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    // Fsync the directory entry to reduce metadata-loss risk on crash.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_parent_dirs_and_writes() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/c.txt");

        write_atomic(&target, b"hello").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&target).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn replaces_existing_content_fully() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("state.json");

        write_atomic(&target, b"first version").await.unwrap();
        write_atomic(&target, b"second").await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&target).await.unwrap(), "second");
        // No stray temp files left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}

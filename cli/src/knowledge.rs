use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

const EXTENSIONS: &[&str] = &["md", "txt"];

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// Reads every `.md`/`.txt` file under `path` (or `path` itself when it is a
/// file) in path order. Blank files are skipped and a missing path yields
/// nothing.
pub fn load_documents(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(vec![]);
    }

    let mut files: Vec<_> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_document(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        if !text.trim().is_empty() {
            documents.push(text);
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_directories_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.md"), "second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("nested/c.MD"), "third").unwrap();
        std::fs::write(dir.path().join("skip.json"), "{}").unwrap();
        std::fs::write(dir.path().join("blank.md"), "  \n").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs, vec!["first", "second", "third"]);
    }

    #[test]
    fn single_file_and_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, "hello").unwrap();

        assert_eq!(load_documents(&file).unwrap(), vec!["hello"]);
        assert!(load_documents(&dir.path().join("absent")).unwrap().is_empty());
    }
}

use crate::error::StoreError;
use crate::models::{DocumentRef, StoredDocument, SubjectFilters};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, filters: &SubjectFilters) -> Result<Vec<StoredDocument>, StoreError>;

    async fn fetch(&self, reference: &DocumentRef) -> Result<StoredDocument, StoreError>;
}

#[async_trait]
impl<T> DocumentStore for Arc<T>
where
    T: DocumentStore + ?Sized,
{
    async fn find(&self, filters: &SubjectFilters) -> Result<Vec<StoredDocument>, StoreError> {
        (**self).find(filters).await
    }

    async fn fetch(&self, reference: &DocumentRef) -> Result<StoredDocument, StoreError> {
        (**self).fetch(reference).await
    }
}

/// Subject PDFs stored on disk as `<root>/<year>/<semester>/<subject>/<unit>/**/*.pdf`.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentStore {
    root: PathBuf,
}

impl DirectoryDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn selection_dir(&self, filters: &SubjectFilters) -> Result<Option<PathBuf>, StoreError> {
        let mut current = self.root.clone();
        for segment in filters.as_segments() {
            validate_segment(segment)?;
            match resolve_child_dir(&current, segment)? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn find_blocking(&self, filters: &SubjectFilters) -> Result<Vec<StoredDocument>, StoreError> {
        let Some(folder) = self.selection_dir(filters)? else {
            return Ok(Vec::new());
        };

        discover_pdf_files(&folder)
            .into_iter()
            .map(|path| load_document(&path))
            .collect()
    }

    fn fetch_blocking(&self, reference: &DocumentRef) -> Result<StoredDocument, StoreError> {
        let path = PathBuf::from(&reference.location);
        if !path.starts_with(&self.root) {
            return Err(StoreError::InvalidArgument(format!(
                "document {} is outside the store root",
                reference.location
            )));
        }

        let document = match load_document(&path) {
            Err(StoreError::Io(error)) if error.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!(
                    "document {}",
                    reference.location
                )))
            }
            other => other?,
        };

        // A session answers from the exact bytes it was started with.
        if document.reference.document_id != reference.document_id {
            return Err(StoreError::DocumentChanged {
                location: reference.location.clone(),
                expected: reference.document_id.clone(),
                actual: document.reference.document_id,
            });
        }

        Ok(document)
    }
}

#[async_trait]
impl DocumentStore for DirectoryDocumentStore {
    async fn find(&self, filters: &SubjectFilters) -> Result<Vec<StoredDocument>, StoreError> {
        let store = self.clone();
        let filters = filters.clone();
        tokio::task::spawn_blocking(move || store.find_blocking(&filters))
            .await
            .map_err(|error| StoreError::Io(std::io::Error::other(error)))?
    }

    async fn fetch(&self, reference: &DocumentRef) -> Result<StoredDocument, StoreError> {
        let store = self.clone();
        let reference = reference.clone();
        tokio::task::spawn_blocking(move || store.fetch_blocking(&reference))
            .await
            .map_err(|error| StoreError::Io(std::io::Error::other(error)))?
    }
}

fn validate_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(&['/', '\\'][..])
    {
        return Err(StoreError::InvalidArgument(format!(
            "filter value {segment:?} is not a valid folder name"
        )));
    }
    Ok(())
}

/// Exact match first, then a case-insensitive one.
fn resolve_child_dir(parent: &Path, name: &str) -> Result<Option<PathBuf>, StoreError> {
    let exact = parent.join(name);
    if exact.is_dir() {
        return Ok(Some(exact));
    }

    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(StoreError::Io(error)),
    };

    let lowered = name.to_lowercase();
    let mut matches = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .filter(|entry| entry.file_name().to_string_lossy().to_lowercase() == lowered)
        .map(|entry| entry.path())
        .collect::<Vec<_>>();

    matches.sort_unstable();
    Ok(matches.into_iter().next())
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn load_document(path: &Path) -> Result<StoredDocument, StoreError> {
    let content = fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            StoreError::InvalidArgument(format!("path missing filename: {}", path.display()))
        })?
        .to_string();

    Ok(StoredDocument {
        reference: DocumentRef {
            document_id: digest_bytes(&content),
            filename,
            location: path.to_string_lossy().to_string(),
        },
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn java_unit_one() -> SubjectFilters {
        SubjectFilters::new("2nd Year", "1st Semester", "JAVA", "1st unit")
    }

    #[tokio::test]
    async fn finds_pdfs_recursively_under_selection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let unit = dir.path().join("2nd Year/1st Semester/JAVA/1st unit");
        fs::create_dir_all(unit.join("extra"))?;
        fs::write(unit.join("b.pdf"), b"%PDF-1.4\nb")?;
        fs::write(unit.join("extra/a.PDF"), b"%PDF-1.4\na")?;
        fs::write(unit.join("notes.txt"), b"ignored")?;

        let store = DirectoryDocumentStore::new(dir.path());
        let documents = store.find(&java_unit_one()).await?;

        let names = documents
            .iter()
            .map(|doc| doc.reference.filename.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["b.pdf", "a.PDF"]);
        assert_eq!(documents[0].reference.document_id, digest_bytes(b"%PDF-1.4\nb"));
        Ok(())
    }

    #[tokio::test]
    async fn folder_names_match_case_insensitively() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let unit = dir.path().join("2nd year/1st semester/Java/1st Unit");
        fs::create_dir_all(&unit)?;
        fs::write(unit.join("unit1.pdf"), b"%PDF-1.4")?;

        let store = DirectoryDocumentStore::new(dir.path());
        assert_eq!(store.find(&java_unit_one()).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_selection_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = DirectoryDocumentStore::new(dir.path());
        assert!(store.find(&java_unit_one()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn traversal_in_filters_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = DirectoryDocumentStore::new(dir.path());
        let filters = SubjectFilters::new("..", "1st Semester", "JAVA", "1st unit");

        let result = store.find(&filters).await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_reports_deleted_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let unit = dir.path().join("2nd Year/1st Semester/JAVA/1st unit");
        fs::create_dir_all(&unit)?;
        fs::write(unit.join("unit1.pdf"), b"%PDF-1.4")?;

        let store = DirectoryDocumentStore::new(dir.path());
        let found = store.find(&java_unit_one()).await?;
        let reference = found[0].reference.clone();
        assert_eq!(store.fetch(&reference).await?.content, b"%PDF-1.4");

        fs::remove_file(unit.join("unit1.pdf"))?;
        assert!(matches!(
            store.fetch(&reference).await,
            Err(StoreError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_rejects_documents_replaced_after_discovery(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let unit = dir.path().join("2nd Year/1st Semester/JAVA/1st unit");
        fs::create_dir_all(&unit)?;
        fs::write(unit.join("unit1.pdf"), b"%PDF-1.4 first edition")?;

        let store = DirectoryDocumentStore::new(dir.path());
        let reference = store.find(&java_unit_one()).await?[0].reference.clone();

        fs::write(unit.join("unit1.pdf"), b"%PDF-1.4 second edition")?;
        match store.fetch(&reference).await {
            Err(StoreError::DocumentChanged {
                expected, actual, ..
            }) => {
                assert_eq!(expected, digest_bytes(b"%PDF-1.4 first edition"));
                assert_eq!(actual, digest_bytes(b"%PDF-1.4 second edition"));
            }
            other => panic!("expected a changed-document error, got {other:?}"),
        }
        Ok(())
    }
}

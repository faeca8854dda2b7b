//! Download and unpack the source artifact.

use std::path::Path;

use tracing::{info, instrument};

use sitegen_artifacts::extract_archive;
use sitegen_shared::{InputArtifact, Result};
use sitegen_storage::ArtifactStore;

use crate::workspace::scratch_file;

/// Fetch the input archive and extract it into `source_dir`.
///
/// The archive is staged in a temporary file under `scratch_root` (or the
/// system temp dir) and removed once extracted. The revision marker is only
/// logged; whatever object currently sits at the key is used.
#[instrument(skip_all, fields(source = %input.location))]
pub async fn download_source<S: ArtifactStore>(
    store: &S,
    input: &InputArtifact,
    source_dir: &Path,
    scratch_root: Option<&Path>,
) -> Result<usize> {
    info!(
        revision = input.revision.as_deref().unwrap_or("<none>"),
        "fetching source"
    );

    let archive = scratch_file(scratch_root, "source", ".zip")?;
    let bytes = store.download(&input.location, archive.path()).await?;
    let entries = extract_archive(archive.path(), source_dir)?;

    info!(bytes, entries, "source ready");
    Ok(entries)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, zip_tree};
    use sitegen_shared::{S3Location, SitegenError};
    use std::fs;

    fn input() -> InputArtifact {
        InputArtifact {
            location: S3Location {
                bucket: "artifacts".into(),
                key: "pipe/SourceArti/abc.zip".into(),
            },
            revision: Some("7d1c2a9f3e".into()),
        }
    }

    #[tokio::test]
    async fn extracts_nested_tree() {
        let tree = tempfile::tempdir().unwrap();
        fs::create_dir_all(tree.path().join("src/components")).unwrap();
        fs::write(tree.path().join("package.json"), "{}").unwrap();
        fs::write(tree.path().join("src/components/App.js"), "export default 1;").unwrap();
        fs::write(tree.path().join(".env.production"), "A=1").unwrap();

        let store = MemoryStore::default();
        store.put(&input().location, zip_tree(tree.path()));
        let source = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let entries = download_source(&store, &input(), source.path(), Some(scratch.path()))
            .await
            .expect("download");

        assert_eq!(entries, 5);
        assert_eq!(
            fs::read_to_string(source.path().join("src/components/App.js")).unwrap(),
            "export default 1;"
        );
        assert!(source.path().join(".env.production").is_file());
        // Staged archive is gone.
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryStore::default();
        let source = tempfile::tempdir().unwrap();

        let err = download_source(&store, &input(), source.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SitegenError::NotFound { .. }));
        assert_eq!(fs::read_dir(source.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn corrupt_object_is_archive_error() {
        let store = MemoryStore::default();
        store.put(&input().location, b"<Error>not a zip</Error>".to_vec());
        let source = tempfile::tempdir().unwrap();

        let err = download_source(&store, &input(), source.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SitegenError::Archive { .. }));
    }
}

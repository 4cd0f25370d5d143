//! Corpus loading from files, directories and URLs.

use std::path::Path;

use tandem_core::error::RetrievalError;
use tracing::{debug, info};

/// File extensions read when the corpus is a directory.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "py", "rs", "json", "yaml", "yml", "toml", "csv", "html", "log",
];

/// One loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path or URL it was read from
    pub source: String,
    pub text: String,
}

/// Load every document under `location`.
///
/// `location` is an http(s) URL, a file, or a directory (read one level
/// deep, text files only, in name order).
pub async fn load_corpus(location: &str) -> Result<Vec<Document>, RetrievalError> {
    let docs = if location.starts_with("http://") || location.starts_with("https://") {
        vec![fetch_url(location).await?]
    } else {
        load_path(Path::new(location)).await?
    };

    let docs: Vec<Document> = docs.into_iter().filter(|d| !d.text.trim().is_empty()).collect();
    if docs.is_empty() {
        return Err(RetrievalError::EmptyCorpus(location.to_string()));
    }

    info!(source = location, documents = docs.len(), "Loaded corpus");
    Ok(docs)
}

async fn fetch_url(url: &str) -> Result<Document, RetrievalError> {
    let load_failed = |reason: String| RetrievalError::LoadFailed {
        source_path: url.to_string(),
        reason,
    };

    debug!(url, "Fetching corpus document");
    let response = reqwest::get(url).await.map_err(|e| load_failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(load_failed(format!("HTTP {status}")));
    }

    let text = response.text().await.map_err(|e| load_failed(e.to_string()))?;
    Ok(Document {
        source: url.to_string(),
        text,
    })
}

async fn load_path(path: &Path) -> Result<Vec<Document>, RetrievalError> {
    let load_failed = |reason: String| RetrievalError::LoadFailed {
        source_path: path.display().to_string(),
        reason,
    };

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| load_failed(e.to_string()))?;

    if meta.is_file() {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_failed(e.to_string()))?;
        return Ok(vec![Document {
            source: path.display().to_string(),
            text,
        }]);
    }

    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| load_failed(e.to_string()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| load_failed(e.to_string()))?
    {
        let file = entry.path();
        let is_text = file
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_text && file.is_file() {
            files.push(file);
        }
    }
    files.sort();

    let mut docs = Vec::with_capacity(files.len());
    for file in files {
        match tokio::fs::read_to_string(&file).await {
            Ok(text) => docs.push(Document {
                source: file.display().to_string(),
                text,
            }),
            // Binary or unreadable files are skipped
            Err(e) => debug!(file = %file.display(), error = %e, "Skipping corpus file"),
        }
    }

    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn loads_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("README.md");
        std::fs::write(&file, "# AutoGen\nMulti-agent framework.").unwrap();

        let docs = load_corpus(file.to_str().unwrap()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("Multi-agent"));
    }

    #[tokio::test]
    async fn loads_text_files_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.md"), "first").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 159, 146, 150]).unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   ").unwrap();

        let docs = load_corpus(dir.path().to_str().unwrap()).await.unwrap();
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn missing_path_fails() {
        let err = load_corpus("/nonexistent/corpus").await.unwrap_err();
        assert!(matches!(err, RetrievalError::LoadFailed { .. }));
    }

    #[tokio::test]
    async fn empty_directory_is_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_corpus(dir.path().to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyCorpus(_)));
    }

    #[tokio::test]
    async fn fetches_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/README.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("AutoGen enables agents."))
            .mount(&server)
            .await;

        let url = format!("{}/README.md", server.uri());
        let docs = load_corpus(&url).await.unwrap();
        assert_eq!(docs[0].source, url);
        assert_eq!(docs[0].text, "AutoGen enables agents.");
    }

    #[tokio::test]
    async fn url_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = load_corpus(&format!("{}/missing", server.uri())).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}

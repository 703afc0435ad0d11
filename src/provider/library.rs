//! Documents and templates served by the reference provider.
//!
//! Both tables are read once at construction and never change afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::mcp::protocol::MCPResource;

/// URI of the generated index resource.
pub const LIST_URI: &str = "guidelines://list";

/// Maximum number of hits returned by a search.
const MAX_SEARCH_HITS: usize = 20;

/// One markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name without extension
    pub stem: String,
    /// File name with extension
    pub file_name: String,
    /// Full text
    pub content: String,
}

impl Document {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let stem = Path::new(&file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        Self { stem, file_name, content: content.into() }
    }
}

/// Guideline documents and PR templates.
#[derive(Debug, Clone, Default)]
pub struct DocumentLibrary {
    guidelines: Vec<Document>,
    templates: Vec<Document>,
}

impl DocumentLibrary {
    /// Build a library from documents already in memory.
    pub fn from_documents(mut guidelines: Vec<Document>, mut templates: Vec<Document>) -> Self {
        guidelines.sort_by(|a, b| a.stem.cmp(&b.stem));
        templates.sort_by(|a, b| a.stem.cmp(&b.stem));
        Self { guidelines, templates }
    }

    /// Read every `*.md` file directly inside the two directories.
    ///
    /// A missing directory yields no documents.
    pub fn load(guidelines_dir: &Path, templates_dir: &Path) -> Self {
        Self::from_documents(read_markdown_dir(guidelines_dir), read_markdown_dir(templates_dir))
    }

    pub fn guidelines(&self) -> &[Document] {
        &self.guidelines
    }

    pub fn templates(&self) -> &[Document] {
        &self.templates
    }

    /// Find a template by file name (`bug.md`).
    pub fn template(&self, file_name: &str) -> Option<&Document> {
        self.templates.iter().find(|d| d.file_name == file_name)
    }

    /// Resources advertised for this library.
    pub fn resources(&self) -> Vec<MCPResource> {
        let mut resources: Vec<MCPResource> = self
            .guidelines
            .iter()
            .map(|d| markdown_resource("guidelines", d))
            .chain(self.templates.iter().map(|d| markdown_resource("templates", d)))
            .collect();

        resources.push(MCPResource {
            uri: LIST_URI.to_string(),
            name: "list".to_string(),
            description: Some("List all available team guidelines and templates".to_string()),
            mime_type: Some("text/markdown".to_string()),
        });

        resources
    }

    /// Text of a resource, if it exists.
    pub fn read(&self, uri: &str) -> Option<String> {
        if uri == LIST_URI {
            return Some(self.listing());
        }

        let (scheme, stem) = uri.split_once("://")?;
        let documents = match scheme {
            "guidelines" => &self.guidelines,
            "templates" => &self.templates,
            _ => return None,
        };
        documents.iter().find(|d| d.stem == stem).map(|d| d.content.clone())
    }

    /// Markdown index of every document.
    pub fn listing(&self) -> String {
        let mut lines = vec!["## Team Guidelines\n".to_string()];
        lines.extend(self.guidelines.iter().map(|d| format!("- {}: guidelines://{}", d.stem, d.stem)));
        lines.push("\n## Templates\n".to_string());
        lines.extend(self.templates.iter().map(|d| format!("- {}: templates://{}", d.stem, d.stem)));
        lines.join("\n")
    }

    /// Case-insensitive line search across guidelines, then templates.
    pub fn search(&self, keyword: &str) -> String {
        let lowered = keyword.to_lowercase();
        let needle = lowered.as_str();
        let hits: Vec<String> = self
            .guidelines
            .iter()
            .chain(self.templates.iter())
            .flat_map(|doc| {
                doc.content.split('\n').enumerate().filter_map(move |(i, line)| {
                    line.to_lowercase()
                        .contains(needle)
                        .then(|| format!("[{}:{}] {}", doc.stem, i + 1, line.trim()))
                })
            })
            .collect();

        if hits.is_empty() {
            return format!("No matches found for '{}'", keyword);
        }

        let shown: Vec<&str> = hits.iter().take(MAX_SEARCH_HITS).map(String::as_str).collect();
        format!("Found {} matches for '{}':\n\n{}", hits.len(), keyword, shown.join("\n"))
    }
}

fn markdown_resource(scheme: &str, document: &Document) -> MCPResource {
    MCPResource {
        uri: format!("{}://{}", scheme, document.stem),
        name: document.stem.clone(),
        description: document.content.lines().next().map(|l| l.trim_start_matches('#').trim().to_string()),
        mime_type: Some("text/markdown".to_string()),
    }
}

fn read_markdown_dir(dir: &Path) -> Vec<Document> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "Document directory not found");
        return Vec::new();
    }

    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
        .filter_map(|entry| {
            let path = entry.path();
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    Some(Document::new(entry.file_name().to_string_lossy().into_owned(), content))
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                    None
                }
            }
        })
        .collect()
}

/// Template labels and the change-type lookup used to suggest one.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    labels: Vec<(String, String)>,
    type_mapping: BTreeMap<String, String>,
    fallback: String,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        let labels = [
            ("bug.md", "Bug Fix"),
            ("feature.md", "Feature"),
            ("docs.md", "Documentation"),
            ("refactor.md", "Refactor"),
            ("test.md", "Test"),
            ("performance.md", "Performance"),
            ("security.md", "Security"),
        ];
        let mapping = [
            ("bug", "bug.md"),
            ("fix", "bug.md"),
            ("feature", "feature.md"),
            ("enhancement", "feature.md"),
            ("docs", "docs.md"),
            ("documentation", "docs.md"),
            ("refactor", "refactor.md"),
            ("cleanup", "refactor.md"),
            ("test", "test.md"),
            ("testing", "test.md"),
            ("performance", "performance.md"),
            ("optimization", "performance.md"),
            ("security", "security.md"),
        ];

        Self {
            labels: labels.iter().map(|(f, l)| (f.to_string(), l.to_string())).collect(),
            type_mapping: mapping.iter().map(|(t, f)| (t.to_string(), f.to_string())).collect(),
            fallback: "feature.md".to_string(),
        }
    }
}

impl TemplateCatalog {
    /// Add or override change-type entries.
    pub fn with_type_mapping(mut self, extra: &BTreeMap<String, String>) -> Self {
        for (change_type, file_name) in extra {
            self.type_mapping.insert(change_type.to_lowercase(), file_name.clone());
        }
        self
    }

    /// `(file name, label)` pairs in display order.
    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    /// Template file for a change type; unknown types get the feature template.
    pub fn resolve(&self, change_type: &str) -> &str {
        self.type_mapping.get(&change_type.to_lowercase()).unwrap_or(&self.fallback)
    }
}

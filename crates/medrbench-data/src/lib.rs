//! medrbench-data: Upstream MedRBench case files.
//!
//! Fetches the diagnosis and treatment files over HTTP, caches them on disk
//! and splits them into [`RawCaseEntry`] values for assembly. Local files
//! can stand in for either category.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;

use medrbench_core::model::{Category, Split};
use medrbench_core::normalize::RawCaseEntry;

pub const DIAGNOSIS_URL: &str = "https://raw.githubusercontent.com/MAGIC-AI4Med/MedRBench/refs/heads/main/data/MedRBench/diagnosis_957_cases_with_rare_disease_491.json";
pub const TREATMENT_URL: &str = "https://raw.githubusercontent.com/MAGIC-AI4Med/MedRBench/refs/heads/main/data/MedRBench/treatment_496_cases_with_rare_disease_165.json";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Upstream URL for a category.
pub fn default_url(category: Category) -> &'static str {
    match category {
        Category::Diagnosis => DIAGNOSIS_URL,
        Category::Treatment => TREATMENT_URL,
    }
}

/// Where one category's cases come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Url(String),
    File(PathBuf),
}

impl DataSource {
    pub fn describe(&self) -> String {
        match self {
            DataSource::Url(url) => url.clone(),
            DataSource::File(path) => path.display().to_string(),
        }
    }
}

/// Loads raw entries per category, with an on-disk cache for URLs.
pub struct DataLoader {
    client: reqwest::Client,
    cache_dir: PathBuf,
    refresh: bool,
    sources: BTreeMap<Category, DataSource>,
}

impl DataLoader {
    /// A loader for the upstream URLs, caching under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        let sources = Category::ALL
            .iter()
            .map(|&c| (c, DataSource::Url(default_url(c).to_string())))
            .collect();

        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
            refresh: false,
            sources,
        })
    }

    /// Ignore cached copies and fetch again.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_source(mut self, category: Category, source: DataSource) -> Self {
        self.sources.insert(category, source);
        self
    }

    pub fn with_url(self, category: Category, url: impl Into<String>) -> Self {
        self.with_source(category, DataSource::Url(url.into()))
    }

    pub fn with_file(self, category: Category, path: impl Into<PathBuf>) -> Self {
        self.with_source(category, DataSource::File(path.into()))
    }

    pub fn source(&self, category: Category) -> Option<&DataSource> {
        self.sources.get(&category)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache location for a category's file fetched from `url`.
    ///
    /// Files live under `{cache_dir}/{category}/`, named after the URL, so a
    /// changed source URL never reuses another URL's download.
    pub fn cache_path(&self, category: Category, url: &str) -> PathBuf {
        cache_file_impl(&self.cache_dir, category, url)
    }

    /// Load the categories `split` needs, in assembly order.
    pub async fn load(&self, split: Split) -> Result<Vec<RawCaseEntry>> {
        let mut entries = Vec::new();
        for &category in split.categories() {
            entries.extend(self.load_category(category).await?);
        }
        Ok(entries)
    }

    /// Load one category's entries.
    pub async fn load_category(&self, category: Category) -> Result<Vec<RawCaseEntry>> {
        let source = self
            .sources
            .get(&category)
            .with_context(|| format!("no data source for {category}"))?;

        let text = match source {
            DataSource::File(path) => fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {category} data: {}", path.display()))?,
            DataSource::Url(url) => self.fetch_cached(category, url).await?,
        };

        let entries = parse_entries(&text, category)
            .with_context(|| format!("failed to parse {category} data from {}", source.describe()))?;
        tracing::info!("loaded {} {category} entries", entries.len());
        Ok(entries)
    }

    async fn fetch_cached(&self, category: Category, url: &str) -> Result<String> {
        let cache_path = self.cache_path(category, url);

        if !self.refresh {
            if let Ok(text) = fs::read_to_string(&cache_path).await {
                tracing::debug!("cache hit for {category}: {}", cache_path.display());
                return Ok(text);
            }
        }

        tracing::info!("fetching {category} cases from {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("failed to fetch {url}"))?;
        let text = response
            .text()
            .await
            .with_context(|| format!("failed to read response body from {url}"))?;

        // Refuse to cache something that is not JSON.
        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("{url} did not return JSON"))?;

        if let Err(e) = write_atomic(&cache_path, &text).await {
            tracing::warn!("could not cache {category} data: {e:#}");
        }
        Ok(text)
    }
}

fn cache_file_impl(cache_dir: &Path, category: Category, url: &str) -> PathBuf {
    let trimmed = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .trim_end_matches('/');
    let name: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    cache_dir
        .join(category.to_string())
        .join(format!("{name}.json"))
}

async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create cache directory {}", parent.display()))?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)
        .await
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("failed to move cache file into {}", path.display()))?;
    Ok(())
}

/// Split a case file into raw entries tagged with `category`.
///
/// Accepts the upstream id-keyed object (key order preserved) or an array
/// of objects that carry their own id.
pub fn parse_entries(text: &str, category: Category) -> Result<Vec<RawCaseEntry>> {
    let value: Value = serde_json::from_str(text).context("invalid JSON")?;
    match value {
        Value::Object(map) => Ok(RawCaseEntry::from_keyed_object(map, category)),
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| RawCaseEntry::new(String::new(), item).with_category(category))
            .collect()),
        other => anyhow::bail!(
            "expected a JSON object keyed by case id or an array, found {}",
            json_kind(&other)
        ),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream_diagnosis() -> String {
        serde_json::json!({
            "PMC200": {
                "generate_case": {
                    "case_summary": "Fever and neck stiffness.",
                    "diagnosis_results": "Bacterial meningitis"
                },
                "body_category": ["Nervous system"],
                "checked_rare_disease": []
            },
            "PMC100": {
                "generate_case": {
                    "case_summary": "Painless jaundice and weight loss.",
                    "diagnosis_results": "Pancreatic adenocarcinoma"
                },
                "checked_rare_disease": ["Pancreatic adenocarcinoma"]
            }
        })
        .to_string()
    }

    #[test]
    fn keyed_object_preserves_order() {
        let entries = parse_entries(&upstream_diagnosis(), Category::Diagnosis).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_id, "PMC200");
        assert_eq!(entries[1].source_id, "PMC100");
        assert_eq!(entries[0].value["category"], "diagnosis");
    }

    #[test]
    fn array_entries_keep_their_ids() {
        let text = r#"[{"pmc_id": "PMC1", "case_summary": "x", "reference_answer": "y"}]"#;
        let entries = parse_entries(text, Category::Treatment).unwrap();
        assert_eq!(entries[0].source_id, "");
        let record = medrbench_core::normalize::normalize(&entries[0]).unwrap();
        assert_eq!(record.case_id, "treatment/PMC1");
    }

    #[test]
    fn scalar_document_rejected() {
        let err = parse_entries("42", Category::Diagnosis).unwrap_err();
        assert!(err.to_string().contains("a number"));
        assert!(parse_entries("not json", Category::Diagnosis).is_err());
    }

    #[tokio::test]
    async fn fetches_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/diagnosis.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(upstream_diagnosis()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = tempfile::tempdir().unwrap();
        let url = format!("{}/diagnosis.json", server.uri());
        let loader = DataLoader::new(cache.path())
            .unwrap()
            .with_url(Category::Diagnosis, &url);

        let first = loader.load_category(Category::Diagnosis).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(loader.cache_path(Category::Diagnosis, &url).exists());

        // Served from cache; the mock expects exactly one request.
        let second = loader.load_category(Category::Diagnosis).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/diagnosis.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(upstream_diagnosis()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = tempfile::tempdir().unwrap();
        let url = format!("{}/diagnosis.json", server.uri());
        let loader = DataLoader::new(cache.path())
            .unwrap()
            .with_url(Category::Diagnosis, &url)
            .with_refresh(true);
        let cached = loader.cache_path(Category::Diagnosis, &url);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, "{}").unwrap();

        let entries = loader.load_category(Category::Diagnosis).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = tempfile::tempdir().unwrap();
        let url = format!("{}/missing.json", server.uri());
        let loader = DataLoader::new(cache.path())
            .unwrap()
            .with_url(Category::Treatment, &url);

        let err = loader.load_category(Category::Treatment).await.unwrap_err();
        assert!(format!("{err:#}").contains("missing.json"));
        assert!(!loader.cache_path(Category::Treatment, &url).exists());
    }

    fn single_case(id: &str) -> String {
        serde_json::json!({
            id: {
                "generate_case": {
                    "case_summary": "Cough for three weeks.",
                    "diagnosis_results": "Tuberculosis"
                }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn changed_url_is_fetched_not_served_from_cache() {
        let server_a = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(single_case("PMC_A")))
            .expect(1)
            .mount(&server_a)
            .await;
        let server_b = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(single_case("PMC_B")))
            .expect(1)
            .mount(&server_b)
            .await;

        let cache = tempfile::tempdir().unwrap();
        let url_a = format!("{}/diagnosis.json", server_a.uri());
        let url_b = format!("{}/diagnosis.json", server_b.uri());

        let first = DataLoader::new(cache.path())
            .unwrap()
            .with_url(Category::Diagnosis, &url_a)
            .load_category(Category::Diagnosis)
            .await
            .unwrap();
        assert_eq!(first[0].source_id, "PMC_A");

        let loader_b = DataLoader::new(cache.path())
            .unwrap()
            .with_url(Category::Diagnosis, &url_b);
        let second = loader_b.load_category(Category::Diagnosis).await.unwrap();
        assert_eq!(second[0].source_id, "PMC_B");
        assert_eq!(server_b.received_requests().await.unwrap().len(), 1);

        // Both downloads stay cached side by side.
        assert_ne!(
            loader_b.cache_path(Category::Diagnosis, &url_a),
            loader_b.cache_path(Category::Diagnosis, &url_b)
        );
        assert!(loader_b.cache_path(Category::Diagnosis, &url_a).exists());
        assert!(loader_b.cache_path(Category::Diagnosis, &url_b).exists());
    }

    #[test]
    fn cache_path_is_keyed_by_category_and_url() {
        let loader = DataLoader::new("/cache").unwrap();
        assert_eq!(
            loader.cache_path(Category::Treatment, "https://example.org/data/t.json?rev=2"),
            PathBuf::from("/cache/treatment/example.org_data_t.json_rev_2.json")
        );
        assert_ne!(
            loader.cache_path(Category::Diagnosis, DIAGNOSIS_URL),
            loader.cache_path(Category::Treatment, DIAGNOSIS_URL)
        );
    }

    #[tokio::test]
    async fn only_needed_categories_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let diagnosis = dir.path().join("diagnosis.json");
        std::fs::write(&diagnosis, upstream_diagnosis()).unwrap();

        // The treatment source points nowhere; a diagnosis split never touches it.
        let loader = DataLoader::new(dir.path().join("cache"))
            .unwrap()
            .with_file(Category::Diagnosis, &diagnosis)
            .with_file(Category::Treatment, dir.path().join("absent.json"));

        let entries = loader.load(Split::Diagnosis).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(loader.load(Split::All).await.is_err());
    }

    #[test]
    fn default_sources_are_upstream() {
        let loader = DataLoader::new("/tmp/unused").unwrap();
        assert_eq!(
            loader.source(Category::Treatment),
            Some(&DataSource::Url(TREATMENT_URL.to_string()))
        );
        assert!(DIAGNOSIS_URL.ends_with("diagnosis_957_cases_with_rare_disease_491.json"));
    }
}

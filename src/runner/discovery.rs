//! Test discovery: walks a directory tree and turns matching YAML files into
//! an ordered sequence of test units.

use super::api::ApiTestBody;
use super::unit::{BrokenUnit, SkippedUnit, TestUnit};
use crate::error::DiscoveryError;
use crate::parser::yaml::parse_test_file;
use log::{debug, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Discovery {
    root: PathBuf,
    files: Vec<PathBuf>,
    request_timeout: Duration,
    tags: Vec<String>,
}

impl Discovery {
    /// Validate `root` and list the files whose name matches `pattern`,
    /// sorted by path.
    pub fn scan(root: &Path, pattern: &str) -> Result<Self, DiscoveryError> {
        if !root.exists() {
            return Err(DiscoveryError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
        }
        std::fs::read_dir(root).map_err(|source| DiscoveryError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let matcher = glob::Pattern::new(pattern).map_err(|e| DiscoveryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if matcher.matches(&name) {
                files.push(entry.into_path());
            }
        }
        files.sort();

        debug!("Discovered {} test file(s) under {}", files.len(), root.display());

        Ok(Self {
            root: root.to_path_buf(),
            files,
            request_timeout: Duration::from_secs(10),
            tags: Vec::new(),
        })
    }

    /// Timeout handed to every declarative request body
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Keep only cases carrying one of `tags` (file tags count for every
    /// case in the file). Empty keeps everything.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Lazy iterator over the units. Files are parsed as the iterator
    /// reaches them; every call starts again from the first file.
    pub fn units(&self) -> Units<'_> {
        Units {
            discovery: self,
            next_file: 0,
            pending: VecDeque::new(),
        }
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn load(&self, path: &Path) -> Vec<TestUnit> {
        let rel = self.relative(path);

        let file = match parse_test_file(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not load {}: {:#}", rel, e);
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| rel.clone());
                let body = Arc::new(BrokenUnit {
                    error: format!("{:#}", e),
                });
                return vec![TestUnit::new(&format!("{}::<load>", rel), &name, path.to_path_buf(), body)];
            }
        };

        let selected = |case_tags: &[String]| {
            self.tags.is_empty()
                || file
                    .tags
                    .iter()
                    .chain(case_tags)
                    .any(|t| self.tags.iter().any(|want| want.eq_ignore_ascii_case(t)))
        };

        file.tests
            .iter()
            .filter(|case| selected(&case.tags))
            .cloned()
            .map(|case| {
                let id = format!("{}::{}", rel, case.name);
                let name = case.name.clone();
                let description = case
                    .description
                    .clone()
                    .or_else(|| file.description.clone());
                let body: Arc<dyn super::unit::TestBody> = match &file.skip {
                    Some(reason) => Arc::new(SkippedUnit {
                        reason: reason.clone(),
                    }),
                    None => Arc::new(ApiTestBody::new(case, self.request_timeout)),
                };
                TestUnit::new(&id, &name, path.to_path_buf(), body)
                    .with_suite(file.name.clone())
                    .with_description(description)
            })
            .collect()
    }
}

pub struct Units<'a> {
    discovery: &'a Discovery,
    next_file: usize,
    pending: VecDeque<TestUnit>,
}

impl Iterator for Units<'_> {
    type Item = TestUnit;

    fn next(&mut self) -> Option<TestUnit> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                return Some(unit);
            }
            let path = self.discovery.files.get(self.next_file)?;
            self.next_file += 1;
            self.pending.extend(self.discovery.load(path));
        }
    }
}

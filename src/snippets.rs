use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::strip::strip_comments;

/// Every snippet currently lives in this one difficulty bucket.
pub const LEVEL: &str = "files";

/// One practice file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetEntry {
    pub title: String,
    pub code: String,
}

/// language -> snippets, both sorted by name.
pub type SnippetMap = BTreeMap<String, Vec<SnippetEntry>>;

#[derive(Debug, Serialize)]
pub struct Catalog {
    pub languages: Vec<LanguageGroup>,
}

#[derive(Debug, Serialize)]
pub struct LanguageGroup {
    pub name: String,
    pub levels: Vec<Level>,
}

#[derive(Debug, Serialize)]
pub struct Level {
    pub level: &'static str,
    pub snippets: Vec<SnippetEntry>,
}

#[derive(Debug, Error)]
pub enum SnippetError {
    #[error("language name is empty after sanitizing")]
    InvalidLanguage,

    #[error("file name is empty after sanitizing")]
    InvalidFileName,

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where an upload ended up, with the sanitized names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnippet {
    pub language: String,
    pub title: String,
    pub path: PathBuf,
}

/// Read-only view over a directory of `<language>/<file>` practice snippets.
#[derive(Debug, Clone)]
pub struct SnippetRepository {
    root: PathBuf,
}

impl SnippetRepository {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scans the tree, one level of language directories and one level of files.
    ///
    /// A missing root is an empty repository. Unreadable entries are skipped.
    pub fn scan(&self, strip: bool) -> SnippetMap {
        let mut map = SnippetMap::new();

        for language_dir in visible_entries(&self.root).filter(|p| p.is_dir()) {
            let Some(language) = file_name_of(&language_dir) else {
                continue;
            };

            let snippets = visible_entries(&language_dir)
                .filter(|p| p.is_file())
                .filter_map(|path| {
                    let title = file_name_of(&path)?;
                    let raw = read_lossy(&path)?;
                    let code = if strip {
                        strip_comments(&language, &title, &raw)
                    } else {
                        raw
                    };
                    Some(SnippetEntry { title, code })
                })
                .sorted_by(|a, b| a.title.cmp(&b.title))
                .collect::<Vec<_>>();

            debug!("Found {} snippets for {language}", snippets.len());
            map.insert(language, snippets);
        }

        map
    }

    /// Writes an uploaded snippet to `<root>/<language>/<file>`, overwriting.
    pub fn store_upload(
        &self,
        language: &str,
        file_name: &str,
        contents: &[u8],
    ) -> Result<StoredSnippet, SnippetError> {
        let language = secure_filename(language).ok_or(SnippetError::InvalidLanguage)?;
        let file_name = secure_filename(file_name).ok_or(SnippetError::InvalidFileName)?;

        let dir = self.root.join(&language);
        fs::create_dir_all(&dir).map_err(|source| SnippetError::Write {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(&file_name);
        fs::write(&path, contents).map_err(|source| SnippetError::Write {
            path: path.clone(),
            source,
        })?;

        info!("Stored snippet {language}/{file_name}");
        Ok(StoredSnippet {
            language,
            title: file_name,
            path,
        })
    }
}

impl From<SnippetMap> for Catalog {
    fn from(map: SnippetMap) -> Self {
        let languages = map
            .into_iter()
            .map(|(name, snippets)| LanguageGroup {
                name,
                levels: vec![Level {
                    level: LEVEL,
                    snippets,
                }],
            })
            .collect();

        Catalog { languages }
    }
}

/// Reduces a user-supplied name to something safe to join onto a directory.
///
/// Accented letters are folded to ASCII (`café` becomes `cafe`) and anything
/// without an ASCII form is dropped. Whitespace runs and path separators
/// become `_`, only letters, digits, `_`, `.` and `-` survive, and leading or
/// trailing dots and underscores are trimmed so the result is never hidden
/// and never escapes the parent. `None` when nothing is left.
pub fn secure_filename(name: &str) -> Option<String> {
    let separators = Regex::new(r"[\s/\\]+").ok()?;
    let unsafe_chars = Regex::new(r"[^A-Za-z0-9_.-]").ok()?;

    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let joined = separators.replace_all(&ascii, "_");
    let cleaned = unsafe_chars.replace_all(&joined, "");
    let cleaned = cleaned.trim_matches(['.', '_']);

    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn visible_entries(dir: &Path) -> impl Iterator<Item = PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => Some(entries),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Cannot list {}: {e}", dir.display());
            None
        }
    };

    entries
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| !file_name_of(path).is_some_and(|name| name.starts_with('.')))
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Reads a file as UTF-8, dropping any byte sequences that are not valid.
fn read_lossy(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(
            bytes
                .utf8_chunks()
                .map(|chunk| chunk.valid())
                .collect::<String>(),
        ),
        Err(e) => {
            warn!("Skipping unreadable snippet {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn scan_two_languages() {
        let dir = tempdir().unwrap();
        write(dir.path(), "python/main.py", b"print('hi')\n");
        write(dir.path(), "c/main.c", b"int main(void) { return 0; }\n");

        let map = SnippetRepository::new(dir.path()).scan(false);

        assert_eq!(map.len(), 2);
        assert_eq!(
            map["python"],
            vec![SnippetEntry {
                title: "main.py".into(),
                code: "print('hi')\n".into()
            }]
        );
        assert_eq!(map["c"][0].code, "int main(void) { return 0; }\n");
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let map = SnippetRepository::new(dir.path().join("nope")).scan(true);
        assert!(map.is_empty());
    }

    #[test]
    fn scan_is_flat_and_skips_hidden() {
        let dir = tempdir().unwrap();
        write(dir.path(), "go/b.go", b"package b\n");
        write(dir.path(), "go/a.go", b"package a\n");
        write(dir.path(), "go/nested/deep.go", b"package deep\n");
        write(dir.path(), "go/.DS_Store", b"junk");
        write(dir.path(), ".git/config", b"[core]\n");
        write(dir.path(), "README.md", b"not a language\n");

        let map = SnippetRepository::new(dir.path()).scan(false);

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["go"]);
        let titles: Vec<_> = map["go"].iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["a.go", "b.go"]);
    }

    #[test]
    fn empty_language_dir_is_listed() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vhdl")).unwrap();
        let map = SnippetRepository::new(dir.path()).scan(false);
        assert!(map["vhdl"].is_empty());
    }

    #[test]
    fn undecodable_bytes_are_dropped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "c/bad.c", b"int \xff\xfex;\n");
        let map = SnippetRepository::new(dir.path()).scan(false);
        assert_eq!(map["c"][0].code, "int x;\n");
    }

    #[test]
    fn scan_strips_when_asked() {
        let dir = tempdir().unwrap();
        write(dir.path(), "stm32/uart.c", b"/* header */\nint x; // x\n");
        let repo = SnippetRepository::new(dir.path());

        assert_eq!(repo.scan(true)["stm32"][0].code, "\nint x;\n");
        assert_eq!(repo.scan(false)["stm32"][0].code, "/* header */\nint x; // x\n");
    }

    #[test]
    fn catalog_shape() {
        let mut map = SnippetMap::new();
        map.insert(
            "python".into(),
            vec![SnippetEntry {
                title: "main.py".into(),
                code: "x = 1".into(),
            }],
        );

        let json = serde_json::to_value(Catalog::from(map)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "languages": [{
                    "name": "python",
                    "levels": [{
                        "level": "files",
                        "snippets": [{"title": "main.py", "code": "x = 1"}]
                    }]
                }]
            })
        );
    }

    #[test]
    fn secure_filename_cases() {
        assert_eq!(secure_filename("main.c").as_deref(), Some("main.c"));
        assert_eq!(secure_filename("my file.py").as_deref(), Some("my_file.py"));
        assert_eq!(secure_filename("../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(secure_filename("C:\\tmp\\x.c").as_deref(), Some("C_tmp_x.c"));
        assert_eq!(secure_filename(".bashrc").as_deref(), Some("bashrc"));
        assert_eq!(secure_filename("größe.rs").as_deref(), Some("groe.rs"));
        assert_eq!(secure_filename("café menu.py").as_deref(), Some("cafe_menu.py"));
        assert_eq!(secure_filename("Ångström\tnotes.c").as_deref(), Some("Angstrom_notes.c"));
        assert_eq!(secure_filename("../.."), None);
        assert_eq!(secure_filename("   "), None);
    }

    #[test]
    fn upload_creates_language_dir_and_overwrites() {
        let dir = tempdir().unwrap();
        let repo = SnippetRepository::new(dir.path());

        let stored = repo.store_upload("Rust lang", "lib.rs", b"fn a() {}").unwrap();
        assert_eq!(stored.language, "Rust_lang");
        assert_eq!(stored.title, "lib.rs");
        assert_eq!(stored.path, dir.path().join("Rust_lang").join("lib.rs"));

        repo.store_upload("Rust lang", "lib.rs", b"fn b() {}").unwrap();
        assert_eq!(fs::read_to_string(&stored.path).unwrap(), "fn b() {}");

        let map = repo.scan(false);
        assert_eq!(map["Rust_lang"].len(), 1);
    }

    #[test]
    fn upload_rejects_empty_names() {
        let dir = tempdir().unwrap();
        let repo = SnippetRepository::new(dir.path());

        assert_matches!(
            repo.store_upload("..", "a.c", b""),
            Err(SnippetError::InvalidLanguage)
        );
        assert_matches!(
            repo.store_upload("c", "/", b""),
            Err(SnippetError::InvalidFileName)
        );
    }
}

//! The curated word list behind `eng word`, kept as JSON in the data directory.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub(crate) const WORDS_FILE: &str = "daily_words.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DailyWord {
    pub(crate) eng: String,
    pub(crate) thai: String,
    pub(crate) def: String,
}

pub(crate) fn defaults() -> Vec<DailyWord> {
    vec![
        DailyWord {
            eng: "diligent".into(),
            thai: "ขยันหมั่นเพียร".into(),
            def: "Showing care and conscientiousness in one's work or duties.".into(),
        },
        DailyWord {
            eng: "ubiquitous".into(),
            thai: "มีอยู่ทุกหนทุกแห่ง".into(),
            def: "Present, appearing, or found everywhere.".into(),
        },
    ]
}

/// Reads `<dir>/daily_words.json`. A missing, unreadable or empty list is replaced on disk by
/// the defaults.
pub(crate) async fn load(dir: &Path) -> anyhow::Result<Vec<DailyWord>> {
    let path = dir.join(WORDS_FILE);
    let parsed = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => serde_json::from_str::<Vec<DailyWord>>(&raw).ok(),
        Err(_) => None,
    };
    if let Some(words) = parsed.filter(|w| !w.is_empty()) {
        crate::logging::module!("Loaded {} daily words", words.len());
        return Ok(words);
    }

    tracing::warn!("Could not load {}, writing the default list", path.display());
    let words = defaults();
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, serde_json::to_string_pretty(&words)?).await?;
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("lazybot-words-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_missing_file_is_recreated() {
        let dir = scratch("missing");
        let words = load(&dir).await.unwrap();
        assert_eq!(words, defaults());
        let on_disk: Vec<DailyWord> =
            serde_json::from_str(&std::fs::read_to_string(dir.join(WORDS_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, defaults());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_recreated() {
        let dir = scratch("corrupt");
        std::fs::write(dir.join(WORDS_FILE), "{not json").unwrap();
        assert_eq!(load(&dir).await.unwrap(), defaults());
    }

    #[tokio::test]
    async fn test_existing_list_is_used() {
        let dir = scratch("existing");
        std::fs::write(
            dir.join(WORDS_FILE),
            r#"[{"eng": "serene", "thai": "สงบ", "def": "Calm, peaceful, and untroubled."}]"#,
        )
        .unwrap();
        let words = load(&dir).await.unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].eng, "serene");
    }
}

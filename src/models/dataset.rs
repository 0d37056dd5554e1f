//! Dataset model and loader

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// One unit of benchmark input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Task prompt shown to the model
    pub prompt: String,
    pub language: String,
    /// Candidate code shared by all models when no per-model response exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Pre-generated candidate code keyed by model id
    #[serde(default)]
    pub responses: HashMap<String, String>,
    /// Expected stdout for the output-match check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    /// Auxiliary files materialized into the execution workspace
    #[serde(default)]
    pub files: HashMap<String, String>,
}

impl TestCase {
    /// Candidate code for one model: per-model response, else shared source
    pub fn candidate_for(&self, model_id: &str) -> Option<&str> {
        self.responses
            .get(model_id)
            .map(String::as_str)
            .or(self.source.as_deref())
    }
}

/// A named collection of test cases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub test_cases: Vec<TestCase>,
}

impl Dataset {
    /// Load and validate a dataset from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            BenchError::NotFound(format!("dataset {}: {e}", path.display()))
        })?;
        let dataset: Dataset = serde_json::from_str(&raw)?;
        dataset.validate()?;
        Ok(dataset)
    }

    fn validate(&self) -> BenchResult<()> {
        if self.test_cases.is_empty() {
            return Err(BenchError::Validation(format!(
                "dataset '{}' contains no test cases",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for tc in &self.test_cases {
            if !seen.insert(tc.id.as_str()) {
                return Err(BenchError::Validation(format!(
                    "dataset '{}' contains duplicate test case id '{}'",
                    self.name, tc.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_case(id: &str) -> TestCase {
        TestCase {
            id: id.to_string(),
            name: None,
            prompt: "print hello".to_string(),
            language: "python".to_string(),
            source: Some("print('hello')".to_string()),
            responses: HashMap::new(),
            expected_output: Some("hello".to_string()),
            files: HashMap::new(),
        }
    }

    #[test]
    fn test_candidate_prefers_per_model_response() {
        let mut tc = test_case("t1");
        tc.responses
            .insert("m1".to_string(), "print('from m1')".to_string());

        assert_eq!(tc.candidate_for("m1"), Some("print('from m1')"));
        assert_eq!(tc.candidate_for("m2"), Some("print('hello')"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![test_case("t1"), test_case("t1")],
        };
        assert!(dataset.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        let dataset = Dataset {
            name: "demo".to_string(),
            test_cases: vec![test_case("t1"), test_case("t2")],
        };
        tokio::fs::write(&path, serde_json::to_vec_pretty(&dataset).unwrap())
            .await
            .unwrap();

        let loaded = Dataset::load(&path).await.unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.test_cases.len(), 2);
    }
}

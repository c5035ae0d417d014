use super::Issue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchParams {
    #[serde(rename = "startAt")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<u32>,

    #[serde(rename = "maxResults")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<Vec<String>>,

    #[serde(rename = "validateQuery")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_query: Option<bool>,
}

/// 検索・バックログ共通のレスポンスエンベロープ
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResult {
    #[serde(rename = "startAt")]
    #[serde(default)]
    pub start_at: u32,

    #[serde(rename = "maxResults")]
    #[serde(default)]
    pub max_results: u32,

    #[serde(default)]
    pub total: u32,

    #[serde(default)]
    pub issues: Vec<Issue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<String>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_at(mut self, start_at: u32) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn expand(mut self, expand: Vec<String>) -> Self {
        self.expand = Some(expand);
        self
    }

    pub fn validate_query(mut self, validate: bool) -> Self {
        self.validate_query = Some(validate);
        self
    }

    /// GETリクエスト用のクエリパラメータに変換
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(start_at) = self.start_at {
            query.push(("startAt".to_string(), start_at.to_string()));
        }
        if let Some(max_results) = self.max_results {
            query.push(("maxResults".to_string(), max_results.to_string()));
        }
        if let Some(validate) = self.validate_query {
            query.push(("validateQuery".to_string(), validate.to_string()));
        }
        if let Some(fields) = self.fields.as_ref().filter(|f| !f.is_empty()) {
            query.push(("fields".to_string(), fields.join(",")));
        }
        if let Some(expand) = self.expand.as_ref().filter(|e| !e.is_empty()) {
            query.push(("expand".to_string(), expand.join(",")));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_params_to_query() {
        let params = SearchParams::new()
            .start_at(10)
            .max_results(25)
            .fields(vec!["summary".to_string(), "status".to_string()])
            .expand(vec!["epic".to_string()])
            .validate_query(false);

        let query = params.to_query();

        assert_eq!(
            query,
            vec![
                ("startAt".to_string(), "10".to_string()),
                ("maxResults".to_string(), "25".to_string()),
                ("validateQuery".to_string(), "false".to_string()),
                ("fields".to_string(), "summary,status".to_string()),
                ("expand".to_string(), "epic".to_string()),
            ]
        );
        assert!(SearchParams::new().to_query().is_empty());
    }

    #[test]
    fn test_search_result_deserialization() {
        let json_data = json!({
            "expand": "schema,names",
            "startAt": 0,
            "maxResults": 50,
            "total": 123,
            "issues": [{"id": "10000", "key": "TEST-1", "fields": {"summary": "Test Issue"}}]
        });

        let result: SearchResult = serde_json::from_value(json_data).unwrap();

        assert_eq!(result.total, 123);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].key, "TEST-1");
    }

    #[test]
    fn test_search_result_missing_envelope_members() {
        let result: SearchResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(result.total, 0);
        assert!(result.issues.is_empty());
    }
}

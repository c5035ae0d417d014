use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueType {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask: Option<bool>,
    #[serde(rename = "hierarchyLevel")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy_level: Option<i32>,
}

impl IssueType {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_type_deserialization() {
        let json_data = json!({
            "id": "10000",
            "name": "Epic",
            "self": "https://example.atlassian.net/rest/api/2/issuetype/10000",
            "subtask": false,
            "hierarchyLevel": 1
        });

        let issue_type: IssueType = serde_json::from_value(json_data).unwrap();

        assert_eq!(issue_type.name, "Epic");
        assert_eq!(issue_type.subtask, Some(false));
        assert_eq!(issue_type.hierarchy_level, Some(1));
    }
}

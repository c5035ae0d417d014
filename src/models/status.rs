use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "statusCategory")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_category: Option<StatusCategory>,
}

impl Status {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCategory {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "colorName")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_deserialization() {
        let json_data = json!({
            "id": "1",
            "name": "In Progress",
            "self": "https://example.atlassian.net/rest/api/2/status/1",
            "statusCategory": {
                "id": 4,
                "key": "indeterminate",
                "name": "In Progress",
                "colorName": "yellow"
            }
        });

        let status: Status = serde_json::from_value(json_data).unwrap();

        assert_eq!(status.name, "In Progress");
        let category = status.status_category.unwrap();
        assert_eq!(category.key, "indeterminate");
        assert_eq!(category.color_name, "yellow");
    }
}

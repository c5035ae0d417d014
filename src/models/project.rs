use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "projectTypeKey")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_deserialization() {
        let json_data = json!({
            "id": "10000",
            "key": "TEST",
            "name": "Test Project",
            "self": "https://example.atlassian.net/rest/api/2/project/10000",
            "projectTypeKey": "software"
        });

        let project: Project = serde_json::from_value(json_data).unwrap();

        assert_eq!(project.key, "TEST");
        assert_eq!(project.name, "Test Project");
        assert_eq!(project.project_type_key, Some("software".to_string()));
    }
}

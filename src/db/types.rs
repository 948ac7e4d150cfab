//! Row types for the hosted tables, plus the payloads used to write them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{DbError, DbResult};
use crate::files::FileUpload;

/// Billing record attached one-to-one to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub id: String,
  pub stripe_customer_id: Option<String>,
  pub stripe_subscription_id: Option<String>,
  pub stripe_price_id: Option<String>,
  pub stripe_subscription_status: Option<String>,
}

/// Application profile of an authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub customers: Option<Customer>,
}

impl User {
  /// Name to show in the header.
  pub fn display_name(&self) -> &str {
    self
      .name
      .as_deref()
      .or(self.email.as_deref())
      .unwrap_or(&self.id)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewUser {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub id: String,
  pub owner: String,
  pub name: String,
  #[serde(default)]
  pub featured: bool,
  #[serde(rename = "createdAt")]
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewItem {
  pub owner: String,
  pub name: String,
  pub featured: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub featured: Option<bool>,
}

/// A class groups zero or more documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
  pub id: String,
  pub owner: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(rename = "createdAt")]
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewClass {
  pub owner: String,
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Metadata for a file kept in object storage under `file_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id: String,
  pub class_id: String,
  pub owner_id: String,
  pub title: String,
  pub file_path: String,
  #[serde(rename = "createdAt")]
  pub created_at: DateTime<Utc>,
}

/// Submitted contents of the document form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentForm {
  pub title: String,
  pub file: Option<FileUpload>,
}

impl DocumentForm {
  pub fn new(title: impl Into<String>, file: Option<FileUpload>) -> Self {
    Self {
      title: title.into(),
      file,
    }
  }

  /// Title with surrounding whitespace removed, or a validation error.
  pub fn validated_title(&self) -> DbResult<&str> {
    let title = self.title.trim();
    if title.is_empty() {
      return Err(DbError::Validation("Please enter a title".to_string()));
    }
    Ok(title)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_class_reads_created_at_column() {
    let class: Class = serde_json::from_value(json!({
      "id": "c1",
      "owner": "u1",
      "name": "Algebra",
      "createdAt": "2024-03-01T10:00:00.000000Z"
    }))
    .unwrap();
    assert_eq!(class.description, None);
    assert_eq!(class.created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
  }

  #[test]
  fn test_patch_skips_absent_fields() {
    let patch = ClassPatch {
      name: Some("Geometry".to_string()),
      description: None,
    };
    assert_eq!(serde_json::to_value(patch).unwrap(), json!({"name": "Geometry"}));
  }

  #[test]
  fn test_user_display_name_falls_back() {
    let mut user = User {
      id: "u1".to_string(),
      email: Some("ada@example.com".to_string()),
      name: None,
      customers: None,
    };
    assert_eq!(user.display_name(), "ada@example.com");
    user.name = Some("Ada".to_string());
    assert_eq!(user.display_name(), "Ada");
  }

  #[test]
  fn test_document_form_requires_title() {
    let form = DocumentForm::new("   ", None);
    assert_eq!(
      form.validated_title(),
      Err(DbError::Validation("Please enter a title".to_string()))
    );
    assert_eq!(DocumentForm::new(" Report ", None).validated_title(), Ok("Report"));
  }
}

//! Schemaless content documents (words, scrolling info, YouTube links).
//!
//! Every resource is stored as a JSON body in the `documents` table, keyed by
//! collection. The typed structs below are what the API accepts and returns.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// A content resource type stored in its own collection.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Partial update accepted by `PUT .../{id}`.
    type Patch: DeserializeOwned + Send + 'static;

    /// Collection name in the `documents` table.
    const COLLECTION: &'static str;

    /// Human-readable type name used in response messages.
    const DISPLAY_NAME: &'static str;

    /// Overwrite fields present in `patch`, keep the rest.
    fn apply(&mut self, patch: Self::Patch);

    /// Reject bodies missing required fields.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A stored resource together with its identifier.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Document<T> {
    #[serde(rename = "_id")]
    pub id: Uuid,

    #[serde(flatten)]
    pub body: T,
}

/// Glossary entry.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_description: Option<String>,
}

impl Resource for Word {
    type Patch = Word;
    const COLLECTION: &'static str = "words";
    const DISPLAY_NAME: &'static str = "Word";

    fn apply(&mut self, patch: Word) {
        merge(&mut self.name, patch.name);
        merge(&mut self.description, patch.description);
        merge(&mut self.additional_description, patch.additional_description);
    }
}

/// Announcement shown in the scrolling banner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ScrollingInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ScrollingInfoPatch {
    pub title: Option<String>,
    pub info: Option<String>,
}

impl Resource for ScrollingInfo {
    type Patch = ScrollingInfoPatch;
    const COLLECTION: &'static str = "scrolling_info";
    const DISPLAY_NAME: &'static str = "Scrolling info";

    fn apply(&mut self, patch: ScrollingInfoPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        merge(&mut self.info, patch.info);
    }

    fn check(&self) -> Result<(), String> {
        require("title", &self.title)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct YouTubeLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub link: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct YouTubeLinkPatch {
    pub title: Option<String>,
    pub link: Option<String>,
}

impl Resource for YouTubeLink {
    type Patch = YouTubeLinkPatch;
    const COLLECTION: &'static str = "youtube_links";
    const DISPLAY_NAME: &'static str = "YouTube link";

    fn apply(&mut self, patch: YouTubeLinkPatch) {
        merge(&mut self.title, patch.title);
        if let Some(link) = patch.link {
            self.link = link;
        }
    }

    fn check(&self) -> Result<(), String> {
        require("link", &self.link)
    }
}

fn merge(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("`{field}` is required"))
    } else {
        Ok(())
    }
}

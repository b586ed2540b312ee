//! Typed navigation context.
//!
//! Pages receive their context as a query string (`?editId=..&headsetId=..`).
//! It is parsed once here and passed down as a value.

use serde::{Deserialize, Serialize};

use crate::types::EntityId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub edit_id: Option<EntityId>,
    pub mode: Option<String>,
    pub return_to: Option<String>,
    /// Device the page was opened from; pinned into app-side edits.
    pub headset_id: Option<EntityId>,
    pub id: Option<EntityId>,
    pub name: Option<String>,
    pub app_name: Option<String>,
}

impl PageContext {
    /// Parse a query string, with or without the leading `?`. Unknown keys
    /// and empty values are ignored; the last occurrence of a key wins.
    pub fn from_query(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut ctx = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "editId" => &mut ctx.edit_id,
                "mode" => &mut ctx.mode,
                "returnTo" => &mut ctx.return_to,
                "headsetId" => &mut ctx.headset_id,
                "id" => &mut ctx.id,
                "name" => &mut ctx.name,
                "appName" => &mut ctx.app_name,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        ctx
    }

    /// Serialize back to a query string (no leading `?`).
    pub fn to_query(&self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        let pairs = [
            ("editId", &self.edit_id),
            ("mode", &self.mode),
            ("returnTo", &self.return_to),
            ("headsetId", &self.headset_id),
            ("id", &self.id),
            ("name", &self.name),
            ("appName", &self.app_name),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                out.append_pair(key, value);
            }
        }
        out.finish()
    }

    /// Page to go back to after saving: `returnTo`, with the headset the
    /// page was opened from as its edit target.
    pub fn return_url(&self) -> Option<String> {
        let page = self.return_to.as_deref()?;
        let back = PageContext {
            edit_id: self.headset_id.clone(),
            ..Default::default()
        };
        let query = back.to_query();
        Some(if query.is_empty() {
            create_page_url(page)
        } else {
            format!("{}?{query}", create_page_url(page))
        })
    }
}

/// Route for a logical page name: `"Edit Headset"` → `/edit-headset`.
pub fn create_page_url(page: &str) -> String {
    let slug: Vec<String> = page
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect();
    format!("/{}", slug.join("-"))
}

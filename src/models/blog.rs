use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::user::{ImageRef, User};

pub const TITLE_MIN_CHARS: usize = 10;
pub const TITLE_MAX_CHARS: usize = 70;
pub const INTRO_MIN_CHARS: usize = 100;
pub const SECTION_TITLE_MIN_CHARS: usize = 10;
pub const SECTION_DESCRIPTION_MIN_CHARS: usize = 100;

/// The four image fields a blog can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Main,
    ParaOne,
    ParaTwo,
    ParaThree,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 4] = [
        ImageSlot::Main,
        ImageSlot::ParaOne,
        ImageSlot::ParaTwo,
        ImageSlot::ParaThree,
    ];

    /// Multipart field name the client uses for this image
    pub fn field_name(&self) -> &'static str {
        match self {
            ImageSlot::Main => "mainImage",
            ImageSlot::ParaOne => "paraOneImage",
            ImageSlot::ParaTwo => "paraTwoImage",
            ImageSlot::ParaThree => "paraThreeImage",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub intro: String,
    pub main_image: ImageRef,
    pub para_one_title: Option<String>,
    pub para_one_description: Option<String>,
    pub para_one_image: Option<ImageRef>,
    pub para_two_title: Option<String>,
    pub para_two_description: Option<String>,
    pub para_two_image: Option<ImageRef>,
    pub para_three_title: Option<String>,
    pub para_three_description: Option<String>,
    pub para_three_image: Option<ImageRef>,
    pub category: String,
    pub created_by: String,
    /// Snapshot of the author's name when the blog was created. Later profile
    /// edits are not reflected here.
    pub author_name: String,
    /// Snapshot of the author's avatar URL at creation time
    pub author_avatar: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// Textual blog fields as submitted by a client. Every field is optional so
/// the same shape serves creation and partial updates.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlogFields {
    pub title: Option<String>,
    pub intro: Option<String>,
    pub category: Option<String>,
    pub para_one_title: Option<String>,
    pub para_one_description: Option<String>,
    pub para_two_title: Option<String>,
    pub para_two_description: Option<String>,
    pub para_three_title: Option<String>,
    pub para_three_description: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub published: Option<bool>,
}

impl BlogFields {
    /// Parses the `published` flag as sent by HTML forms
    pub fn parse_published(value: &str) -> Result<bool, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(true),
            "false" | "0" | "off" | "" => Ok(false),
            other => Err(format!("Invalid value for published: {}", other)),
        }
    }
}

/// An image column being swapped for a freshly uploaded asset
#[derive(Debug, Clone, PartialEq)]
pub struct ImageChange {
    pub slot: ImageSlot,
    pub image: ImageRef,
    /// Public id the column must still hold for the write to apply. `None`
    /// means the column must still be empty.
    pub replaces: Option<String>,
}

/// The columns an update writes. Fields absent from `fields` are left as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlogChanges {
    pub fields: BlogFields,
    pub images: Vec<ImageChange>,
}

impl BlogChanges {
    pub fn is_empty(&self) -> bool {
        self.fields == BlogFields::default() && self.images.is_empty()
    }
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(value)) => Ok(Some(value)),
        Some(Flag::Text(text)) => BlogFields::parse_published(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl Blog {
    /// Builds a new, unsaved blog owned by `author`. Title, intro and category
    /// must already be checked by the caller; `validate` enforces the rest.
    pub fn new(fields: BlogFields, main_image: ImageRef, author: &User) -> Self {
        Blog {
            id: Uuid::new_v4().to_string(),
            title: fields.title.unwrap_or_default(),
            intro: fields.intro.unwrap_or_default(),
            main_image,
            para_one_title: non_blank(fields.para_one_title),
            para_one_description: non_blank(fields.para_one_description),
            para_one_image: None,
            para_two_title: non_blank(fields.para_two_title),
            para_two_description: non_blank(fields.para_two_description),
            para_two_image: None,
            para_three_title: non_blank(fields.para_three_title),
            para_three_description: non_blank(fields.para_three_description),
            para_three_image: None,
            category: fields.category.unwrap_or_default(),
            created_by: author.id.clone(),
            author_name: author.name.clone(),
            author_avatar: author.avatar_url(),
            published: fields.published.unwrap_or(false),
            created_at: Utc::now(),
        }
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&ImageRef> {
        match slot {
            ImageSlot::Main => Some(&self.main_image),
            ImageSlot::ParaOne => self.para_one_image.as_ref(),
            ImageSlot::ParaTwo => self.para_two_image.as_ref(),
            ImageSlot::ParaThree => self.para_three_image.as_ref(),
        }
    }

    pub fn set_image(&mut self, slot: ImageSlot, image: ImageRef) {
        match slot {
            ImageSlot::Main => self.main_image = image,
            ImageSlot::ParaOne => self.para_one_image = Some(image),
            ImageSlot::ParaTwo => self.para_two_image = Some(image),
            ImageSlot::ParaThree => self.para_three_image = Some(image),
        }
    }

    /// All remote assets referenced by this blog
    pub fn images(&self) -> Vec<&ImageRef> {
        ImageSlot::ALL
            .iter()
            .filter_map(|slot| self.image(*slot))
            .collect()
    }

    /// Applies the fields present in `fields`, leaving the others untouched.
    /// Ownership and the author snapshot are never modified here.
    pub fn apply(&mut self, fields: BlogFields) {
        if let Some(title) = fields.title {
            self.title = title;
        }
        if let Some(intro) = fields.intro {
            self.intro = intro;
        }
        if let Some(category) = fields.category {
            self.category = category;
        }
        if fields.para_one_title.is_some() {
            self.para_one_title = non_blank(fields.para_one_title);
        }
        if fields.para_one_description.is_some() {
            self.para_one_description = non_blank(fields.para_one_description);
        }
        if fields.para_two_title.is_some() {
            self.para_two_title = non_blank(fields.para_two_title);
        }
        if fields.para_two_description.is_some() {
            self.para_two_description = non_blank(fields.para_two_description);
        }
        if fields.para_three_title.is_some() {
            self.para_three_title = non_blank(fields.para_three_title);
        }
        if fields.para_three_description.is_some() {
            self.para_three_description = non_blank(fields.para_three_description);
        }
        if let Some(published) = fields.published {
            self.published = published;
        }
    }

    /// Field-level rules checked before every write
    pub fn validate(&self) -> Result<(), String> {
        let title_len = self.title.trim().chars().count();
        if title_len < TITLE_MIN_CHARS {
            return Err(format!(
                "Blog title must contain at least {} characters!",
                TITLE_MIN_CHARS
            ));
        }
        if title_len > TITLE_MAX_CHARS {
            return Err(format!(
                "Blog title cannot exceed {} characters!",
                TITLE_MAX_CHARS
            ));
        }

        if self.intro.trim().chars().count() < INTRO_MIN_CHARS {
            return Err(format!(
                "Blog intro must contain at least {} characters!",
                INTRO_MIN_CHARS
            ));
        }

        if self.category.trim().is_empty() {
            return Err("Blog category is required!".to_string());
        }

        if self.main_image.public_id.is_empty() || self.main_image.url.is_empty() {
            return Err("Blog main image is mandatory!".to_string());
        }

        if self.created_by.is_empty() || self.author_name.trim().is_empty() {
            return Err("Blog author is required!".to_string());
        }

        let sections = [
            ("one", &self.para_one_title, &self.para_one_description),
            ("two", &self.para_two_title, &self.para_two_description),
            ("three", &self.para_three_title, &self.para_three_description),
        ];
        for (name, title, description) in sections {
            if let Some(title) = title {
                if title.trim().chars().count() < SECTION_TITLE_MIN_CHARS {
                    return Err(format!(
                        "Paragraph {} title must contain at least {} characters!",
                        name, SECTION_TITLE_MIN_CHARS
                    ));
                }
            }
            if let Some(description) = description {
                if description.trim().chars().count() < SECTION_DESCRIPTION_MIN_CHARS {
                    return Err(format!(
                        "Paragraph {} description must contain at least {} characters!",
                        name, SECTION_DESCRIPTION_MIN_CHARS
                    ));
                }
            }
        }

        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

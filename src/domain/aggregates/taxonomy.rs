//! Category and Brand taxonomy nodes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Slug, SlugError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub website: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDetails {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default = "active")]
    pub is_active: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandDetails {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool { true }

impl Category {
    pub fn create(details: CategoryDetails) -> Result<Self, TaxonomyError> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), slug: Slug::from_name(&details.name)?, name: details.name.trim().to_string(), description: details.description,
            image: details.image, parent_id: details.parent_id, is_active: details.is_active, created_at: now, updated_at: now,
        })
    }

    pub fn revise(&mut self, details: CategoryDetails) -> Result<(), TaxonomyError> {
        if details.parent_id == Some(self.id) { return Err(TaxonomyError::SelfParent); }
        if details.name.trim() != self.name { self.slug = Slug::from_name(&details.name)?; }
        self.name = details.name.trim().to_string();
        self.description = details.description;
        self.image = details.image;
        self.parent_id = details.parent_id;
        self.is_active = details.is_active;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Brand {
    pub fn create(details: BrandDetails) -> Result<Self, TaxonomyError> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), slug: Slug::from_name(&details.name)?, name: details.name.trim().to_string(), description: details.description,
            logo: details.logo, website: details.website, is_active: details.is_active, created_at: now, updated_at: now,
        })
    }

    pub fn revise(&mut self, details: BrandDetails) -> Result<(), TaxonomyError> {
        if details.name.trim() != self.name { self.slug = Slug::from_name(&details.name)?; }
        self.name = details.name.trim().to_string();
        self.description = details.description;
        self.logo = details.logo;
        self.website = details.website;
        self.is_active = details.is_active;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyError { InvalidName, SelfParent, HasProducts(usize), HasChildren(usize) }
impl From<SlugError> for TaxonomyError { fn from(_: SlugError) -> Self { Self::InvalidName } }
impl std::error::Error for TaxonomyError {}
impl std::fmt::Display for TaxonomyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Name must contain at least one letter or digit"),
            Self::SelfParent => write!(f, "A category cannot be its own parent"),
            Self::HasProducts(n) => write!(f, "Cannot delete: {} product(s) still use it. Please reassign or delete products first", n),
            Self::HasChildren(n) => write!(f, "Cannot delete: it still has {} subcategories. Please move them first", n),
        }
    }
}

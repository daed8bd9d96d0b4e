//! Catalog: products, categories and brands.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{EventPublisher, Repos};
use crate::domain::aggregates::{Brand, BrandDetails, Category, CategoryDetails, Product, ProductDetails, TaxonomyError};
use crate::domain::value_objects::Slug;
use crate::store::{Document, Repo};
use crate::{EcommerceError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    /// Category id or slug.
    pub category: Option<String>,
    /// Brand id or slug.
    pub brand: Option<String>,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> { pub data: Vec<T>, pub total: u64, pub page: u32 }

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithCount<T> {
    #[serde(flatten)]
    pub item: T,
    pub product_count: u64,
}

#[derive(Clone)]
pub struct Catalog {
    repos: Repos,
    events: EventPublisher,
}

/// First free slug among `base`, `base-2`, `base-3`, ... ignoring the document itself.
async fn unique_slug<T: Document>(repo: &Repo<T>, base: &Slug, own_id: Option<Uuid>) -> Result<Slug> {
    let mut candidate = base.clone();
    let mut n = 1;
    while let Some(existing) = repo.find_one(json!({ "slug": candidate.as_str() })).await? {
        if Some(existing.id()) == own_id { break; }
        n += 1;
        candidate = base.with_suffix(n);
    }
    Ok(candidate)
}

impl Catalog {
    pub fn new(repos: Repos, events: EventPublisher) -> Self { Self { repos, events } }

    async fn resolve<T: Document>(repo: &Repo<T>, key: &str) -> Result<Option<Uuid>> {
        if let Ok(id) = Uuid::parse_str(key) { return Ok(Some(id)); }
        Ok(repo.find_one(json!({ "slug": key })).await?.map(|doc| doc.id()))
    }

    /// Published products, filtered, sorted and paginated.
    pub async fn list_products(&self, q: ProductQuery) -> Result<Paginated<Product>> {
        let page = q.page.unwrap_or(1).max(1);
        let limit = q.limit.unwrap_or(12).clamp(1, 100);
        let mut filter = json!({ "status": "published" });
        if let Some(key) = q.category.as_deref().filter(|k| !k.is_empty()) {
            match Self::resolve(&self.repos.categories, key).await? {
                Some(id) => filter["categoryId"] = json!(id),
                None => return Ok(Paginated { data: vec![], total: 0, page }),
            }
        }
        if let Some(key) = q.brand.as_deref().filter(|k| !k.is_empty()) {
            match Self::resolve(&self.repos.brands, key).await? {
                Some(id) => filter["brandId"] = json!(id),
                None => return Ok(Paginated { data: vec![], total: 0, page }),
            }
        }
        if let Some(tag) = q.tag.as_deref().filter(|t| !t.is_empty()) { filter["tags"] = json!([tag.trim().to_lowercase()]); }

        let mut products = self.repos.products.find(filter).await?;
        if let Some(term) = q.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            products.retain(|p| p.name.to_lowercase().contains(&term) || p.description.to_lowercase().contains(&term) || p.tags.iter().any(|t| t.contains(&term)));
        }
        match q.sort.as_deref().unwrap_or("newest") {
            "price_asc" => products.sort_by_key(|p| p.effective_price()),
            "price_desc" => products.sort_by_key(|p| std::cmp::Reverse(p.effective_price())),
            "rating" => products.sort_by(|a, b| b.rating.total_cmp(&a.rating).then(b.review_count.cmp(&a.review_count))),
            "name" => products.sort_by(|a, b| a.name.cmp(&b.name)),
            _ => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        let total = products.len() as u64;
        let data = products.into_iter().skip(((page - 1) * limit) as usize).take(limit as usize).collect();
        Ok(Paginated { data, total, page })
    }

    pub async fn product(&self, id: Uuid) -> Result<Product> {
        self.repos.products.get(id).await?.ok_or(EcommerceError::NotFound("Product"))
    }

    pub async fn product_by_slug(&self, slug: &str) -> Result<Product> {
        self.repos.products.find_one(json!({ "slug": slug, "status": "published" })).await?.ok_or(EcommerceError::NotFound("Product"))
    }

    async fn check_references(&self, details: &ProductDetails, own_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = details.category_id {
            if self.repos.categories.get(id).await?.is_none() { return Err(EcommerceError::NotFound("Category")); }
        }
        if let Some(id) = details.brand_id {
            if self.repos.brands.get(id).await?.is_none() { return Err(EcommerceError::NotFound("Brand")); }
        }
        for variant in &details.variants {
            let clash = self.repos.products.find(json!({ "variants": [{ "sku": variant.sku.as_str() }] })).await?;
            if clash.iter().any(|p| Some(p.id) != own_id) {
                return Err(EcommerceError::Validation(format!("SKU {} is already used by another product", variant.sku)));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, details), fields(name = %details.name))]
    pub async fn create_product(&self, details: ProductDetails) -> Result<Product> {
        self.check_references(&details, None).await?;
        let mut product = Product::create(details)?;
        let slug = unique_slug(&self.repos.products, &product.slug, None).await?;
        product.set_slug(slug);
        self.repos.products.insert(&product).await?;
        info!(product_id = %product.id, slug = %product.slug, "Product created");
        self.events.publish(product.take_events()).await;
        Ok(product)
    }

    #[instrument(skip(self, details))]
    pub async fn update_product(&self, id: Uuid, details: ProductDetails) -> Result<Product> {
        let mut product = self.product(id).await?;
        self.check_references(&details, Some(id)).await?;
        if product.revise(details)? {
            let slug = unique_slug(&self.repos.products, &product.slug, Some(id)).await?;
            product.set_slug(slug);
        }
        self.repos.products.save(&product).await?;
        Ok(product)
    }

    /// Deletes the product together with its reviews.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        if !self.repos.products.delete(id).await? { return Err(EcommerceError::NotFound("Product")); }
        for review in self.repos.reviews.find(json!({ "productId": id })).await? {
            self.repos.reviews.delete(review.id).await?;
        }
        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    // ---- categories ----

    pub async fn categories(&self) -> Result<Vec<WithCount<Category>>> {
        let mut out = Vec::new();
        for category in self.repos.categories.all().await? {
            let product_count = self.repos.products.count(json!({ "categoryId": category.id })).await?;
            out.push(WithCount { item: category, product_count });
        }
        out.sort_by(|a, b| a.item.name.cmp(&b.item.name));
        Ok(out)
    }

    pub async fn category_by_slug(&self, slug: &str) -> Result<WithCount<Category>> {
        let category = self.repos.categories.find_one(json!({ "slug": slug })).await?.ok_or(EcommerceError::NotFound("Category"))?;
        let product_count = self.repos.products.count(json!({ "categoryId": category.id })).await?;
        Ok(WithCount { item: category, product_count })
    }

    /// Rejects a parent that does not exist or that sits below `own_id`.
    async fn check_parent(&self, parent_id: Option<Uuid>, own_id: Option<Uuid>) -> Result<()> {
        let mut cursor = parent_id;
        while let Some(id) = cursor {
            if Some(id) == own_id { return Err(TaxonomyError::SelfParent.into()); }
            let parent = self.repos.categories.get(id).await?.ok_or(EcommerceError::NotFound("Parent category"))?;
            cursor = parent.parent_id;
        }
        Ok(())
    }

    pub async fn create_category(&self, details: CategoryDetails) -> Result<Category> {
        self.check_parent(details.parent_id, None).await?;
        let mut category = Category::create(details)?;
        category.slug = unique_slug(&self.repos.categories, &category.slug, None).await?;
        self.repos.categories.insert(&category).await?;
        info!(category_id = %category.id, "Category created");
        Ok(category)
    }

    pub async fn update_category(&self, id: Uuid, details: CategoryDetails) -> Result<Category> {
        let mut category = self.repos.categories.get(id).await?.ok_or(EcommerceError::NotFound("Category"))?;
        self.check_parent(details.parent_id, Some(id)).await?;
        category.revise(details)?;
        category.slug = unique_slug(&self.repos.categories, &category.slug, Some(id)).await?;
        self.repos.categories.save(&category).await?;
        Ok(category)
    }

    /// Refused while products or subcategories still reference the category.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        if self.repos.categories.get(id).await?.is_none() { return Err(EcommerceError::NotFound("Category")); }
        let products = self.repos.products.count(json!({ "categoryId": id })).await?;
        if products > 0 { return Err(TaxonomyError::HasProducts(products as usize).into()); }
        let children = self.repos.categories.count(json!({ "parentId": id })).await?;
        if children > 0 { return Err(TaxonomyError::HasChildren(children as usize).into()); }
        self.repos.categories.delete(id).await?;
        info!(category_id = %id, "Category deleted");
        Ok(())
    }

    // ---- brands ----

    pub async fn brands(&self) -> Result<Vec<WithCount<Brand>>> {
        let mut out = Vec::new();
        for brand in self.repos.brands.all().await? {
            let product_count = self.repos.products.count(json!({ "brandId": brand.id })).await?;
            out.push(WithCount { item: brand, product_count });
        }
        out.sort_by(|a, b| a.item.name.cmp(&b.item.name));
        Ok(out)
    }

    pub async fn brand_by_slug(&self, slug: &str) -> Result<WithCount<Brand>> {
        let brand = self.repos.brands.find_one(json!({ "slug": slug })).await?.ok_or(EcommerceError::NotFound("Brand"))?;
        let product_count = self.repos.products.count(json!({ "brandId": brand.id })).await?;
        Ok(WithCount { item: brand, product_count })
    }

    pub async fn create_brand(&self, details: BrandDetails) -> Result<Brand> {
        let mut brand = Brand::create(details)?;
        brand.slug = unique_slug(&self.repos.brands, &brand.slug, None).await?;
        self.repos.brands.insert(&brand).await?;
        info!(brand_id = %brand.id, "Brand created");
        Ok(brand)
    }

    pub async fn update_brand(&self, id: Uuid, details: BrandDetails) -> Result<Brand> {
        let mut brand = self.repos.brands.get(id).await?.ok_or(EcommerceError::NotFound("Brand"))?;
        brand.revise(details)?;
        brand.slug = unique_slug(&self.repos.brands, &brand.slug, Some(id)).await?;
        self.repos.brands.save(&brand).await?;
        Ok(brand)
    }

    pub async fn delete_brand(&self, id: Uuid) -> Result<()> {
        if self.repos.brands.get(id).await?.is_none() { return Err(EcommerceError::NotFound("Brand")); }
        let products = self.repos.products.count(json!({ "brandId": id })).await?;
        if products > 0 { return Err(TaxonomyError::HasProducts(products as usize).into()); }
        self.repos.brands.delete(id).await?;
        info!(brand_id = %id, "Brand deleted");
        Ok(())
    }
}

//! Seed the catalog from a YAML file.
//!
//! Warehouses are matched by code and products by slug, so a file can be
//! loaded again: existing rows are kept and stock levels are set to the
//! counts in the file.
//!
//! ```yaml
//! warehouses:
//!   - code: MAIN
//!     name: Main warehouse
//!     priority: 10
//! products:
//!   - name: Linen Shirt
//!     price: "49.00"
//!     category: shirts
//!     sizes: [S, M, L]
//!     stock:
//!       MAIN: 20
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use marketstall_core::{WarehouseId, slugify};
use marketstall_storefront::db::{self, InventoryRepository, ProductRepository, WarehouseRepository};
use marketstall_storefront::models::inventory::NewWarehouse;
use marketstall_storefront::models::product::NewProduct;

use super::database_url;

/// Top level of a catalog seed file.
#[derive(Debug, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub warehouses: Vec<NewWarehouse>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

/// A product and its stock per warehouse code.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub category: String,
    pub brand: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub stock: BTreeMap<String, i32>,
}

impl SeedProduct {
    fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }

    fn to_new_product(&self) -> NewProduct {
        NewProduct {
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            price: self.price,
            compare_at_price: self.compare_at_price,
            category: self.category.clone(),
            brand: self.brand.clone(),
            sizes: self.sizes.clone(),
            colors: self.colors.clone(),
            images: self.images.clone(),
            is_featured: self.featured,
        }
    }
}

/// Check a parsed seed file. Returns one message per problem.
#[must_use]
pub fn validate(seed: &CatalogSeed) -> Vec<String> {
    let mut errors = Vec::new();
    let mut codes: Vec<&str> = seed.warehouses.iter().map(|w| w.code.as_str()).collect();
    codes.sort_unstable();
    if codes.windows(2).any(|pair| pair.first() == pair.last()) {
        errors.push("duplicate warehouse code".to_owned());
    }

    let mut slugs = HashMap::new();
    for product in &seed.products {
        let slug = product.slug();
        if slug.is_empty() || slug != slugify(&slug) {
            errors.push(format!("{}: invalid slug '{slug}'", product.name));
        }
        if let Some(previous) = slugs.insert(slug.clone(), product.name.as_str()) {
            errors.push(format!("{}: slug '{slug}' also used by {previous}", product.name));
        }
        if product.price.is_sign_negative() {
            errors.push(format!("{}: negative price", product.name));
        }
        if product.category.trim().is_empty() {
            errors.push(format!("{}: missing category", product.name));
        }
        for (code, quantity) in &product.stock {
            if *quantity < 0 {
                errors.push(format!("{}: negative stock in {code}", product.name));
            }
        }
    }

    errors
}

/// Seed warehouses, products and stock levels from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// names an unknown warehouse code, or a database operation fails.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog seed");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let seed: CatalogSeed = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = db::create_pool(&database_url()?).await?;
    info!("Connected to database");

    let warehouses = WarehouseRepository::new(&pool);
    let products = ProductRepository::new(&pool);
    let inventory = InventoryRepository::new(&pool);

    let mut warehouse_ids: HashMap<String, WarehouseId> = HashMap::new();
    for input in &seed.warehouses {
        let code = input.code.trim().to_ascii_uppercase();
        let warehouse = match warehouses.get_by_code(&code).await? {
            Some(existing) => existing,
            None => {
                let mut input = input.clone();
                input.code.clone_from(&code);
                let created = warehouses.create(&input).await?;
                info!("  Warehouse created: {}", created.code);
                created
            }
        };
        warehouse_ids.insert(code, warehouse.id);
    }

    let mut created = 0usize;
    let mut movements = 0usize;
    for item in &seed.products {
        let slug = item.slug();
        let product = match products.get_by_slug(&slug).await? {
            Some(existing) => existing,
            None => {
                created += 1;
                products.create(&item.to_new_product(), &slug).await?
            }
        };

        for (code, quantity) in &item.stock {
            let code = code.trim().to_ascii_uppercase();
            let warehouse_id = match warehouse_ids.get(&code) {
                Some(id) => *id,
                None => warehouses
                    .get_by_code(&code)
                    .await?
                    .map(|w| w.id)
                    .ok_or_else(|| format!("{}: unknown warehouse '{code}'", item.name))?,
            };

            if inventory
                .set(product.id, warehouse_id, *quantity, None, Some("seed"), None)
                .await?
                .is_some()
            {
                movements += 1;
            }
        }
    }

    info!("Seeding complete!");
    info!("  Warehouses: {}", warehouse_ids.len());
    info!("  Products created: {created} of {}", seed.products.len());
    info!("  Stock movements: {movements}");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SEED: &str = r#"
warehouses:
  - code: MAIN
    name: Main warehouse
    priority: 10
  - code: EU1
    name: Rotterdam
products:
  - name: Linen Shirt
    price: "49.00"
    category: shirts
    sizes: [S, M, L]
    stock:
      MAIN: 20
      EU1: 5
  - name: Canvas Tote
    slug: canvas-tote
    price: "19.50"
    category: bags
"#;

    #[test]
    fn test_parse_seed() {
        let seed: CatalogSeed = serde_yaml::from_str(SEED).unwrap();
        assert_eq!(seed.warehouses.len(), 2);
        assert_eq!(seed.warehouses[1].priority, 100);

        let shirt = &seed.products[0];
        assert_eq!(shirt.slug(), "linen-shirt");
        assert_eq!(shirt.price, Decimal::new(4900, 2));
        assert_eq!(shirt.stock.get("EU1"), Some(&5));
        assert!(validate(&seed).is_empty());
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut seed: CatalogSeed = serde_yaml::from_str(SEED).unwrap();
        seed.products[1].slug = Some("linen-shirt".to_owned());
        seed.products[0].stock.insert("MAIN".to_owned(), -1);

        let errors = validate(&seed);
        assert_eq!(errors.len(), 2, "{errors:?}");
    }
}

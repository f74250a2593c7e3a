//! Shopify Admin API client implementing [`CatalogApi`].
//!
//! REST for everything except SKU lookup, which uses the GraphQL
//! `productVariants` search. Every request carries `X-Shopify-Access-Token`.

use std::time::Duration;

use affsync_core::{
    AppConfig, CatalogApi, CatalogError, CatalogProduct, CatalogStatus, ProductDraft,
};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ShopifyError;
use crate::retry::retry_with_backoff;
use crate::types::{
    CustomCollectionEnvelope, CustomCollectionsEnvelope, GraphqlResponse, InventoryLevelsEnvelope,
    ProductEnvelope, VariantsBySku,
};

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const AFFILIATE_NAMESPACE: &str = "custom";
const AFFILIATE_KEY: &str = "affiliate_link";

const VARIANT_BY_SKU_QUERY: &str = "query variantBySku($q: String!) { productVariants(first: 1, query: $q) \
     { edges { node { id sku inventoryItem { id } product { id title status } } } } }";

#[derive(Debug, Clone)]
pub struct ShopifySettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for ShopifySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "affsync/0.1 (catalog-sync)".to_string(),
            max_retries: 3,
            backoff_base_ms: 1_000,
        }
    }
}

pub struct ShopifyAdminClient {
    client: Client,
    /// `{store}/admin/api/{version}/`, always with a trailing slash.
    base_url: Url,
    access_token: String,
    location_id: Option<i64>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ShopifyAdminClient {
    /// # Errors
    ///
    /// Returns [`ShopifyError::InvalidUrl`] for an unusable store URL, or
    /// [`ShopifyError::Http`] if the HTTP client cannot be built.
    pub fn new(
        store_url: &str,
        access_token: &str,
        api_version: &str,
        location_id: Option<i64>,
        settings: &ShopifySettings,
    ) -> Result<Self, ShopifyError> {
        let store = store_url.trim().trim_end_matches('/');
        let store = if store.starts_with("http://") || store.starts_with("https://") {
            store.to_string()
        } else {
            format!("https://{store}")
        };
        let raw = format!("{store}/admin/api/{}/", api_version.trim_matches('/'));
        let base_url = Url::parse(&raw).map_err(|e| ShopifyError::InvalidUrl {
            url: store_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url,
            access_token: access_token.to_string(),
            location_id,
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    /// # Errors
    ///
    /// Returns [`ShopifyError::MissingConfig`] when the store URL or access
    /// token is not configured.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ShopifyError> {
        let store = config
            .shopify_store_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ShopifyError::MissingConfig("SHOPIFY_STORE_URL"))?;
        let token = config
            .shopify_access_token
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ShopifyError::MissingConfig("SHOPIFY_ACCESS_TOKEN"))?;
        let settings = ShopifySettings {
            timeout: Duration::from_secs(config.request_timeout_secs),
            user_agent: config.user_agent.clone(),
            max_retries: config.max_retries,
            backoff_base_ms: config.retry_backoff_base_ms,
        };
        Self::new(
            store,
            token,
            &config.shopify_api_version,
            config.shopify_location_id,
            &settings,
        )
    }

    fn url(&self, path: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(path)
            .map_err(|e| CatalogError::Transport(format!("bad path {path}: {e}")))
    }

    /// Send one request, retrying transient failures, and return the 2xx
    /// response. `resource`/`id` name the target for a 404.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        resource: &'static str,
        id: &str,
    ) -> Result<Response, CatalogError> {
        let context = format!("{method} {}", url.path());
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header(ACCESS_TOKEN_HEADER, &self.access_token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let context = context.clone();
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| CatalogError::Transport(e.to_string()))?;
                check_status(response, resource, id, &context).await
            }
        })
        .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        resource: &'static str,
        id: &str,
    ) -> Result<T, CatalogError> {
        let context = format!("{method} {}", url.path());
        let response = self.send(method, url, body, resource, id).await?;
        let text = response
            .text()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| CatalogError::Deserialize { context, source: e })
    }

    fn product_body(draft: &ProductDraft, variant_id: Option<i64>) -> Value {
        let mut variant = json!({
            "sku": draft.sku,
            "price": draft.price.to_string(),
            "compare_at_price": draft.compare_at_price.map(|p| p.to_string()),
            "inventory_management": "shopify",
        });
        if let Some(id) = variant_id {
            variant["id"] = json!(id);
        }
        json!({
            "title": draft.title,
            "body_html": draft.body_html,
            "vendor": draft.vendor,
            "product_type": draft.product_type,
            "tags": draft.tags.join(", "),
            "images": [{ "src": draft.image_url }],
            "variants": [variant],
        })
    }
}

/// Map a non-2xx response onto [`CatalogError`]; pass 2xx through.
async fn check_status(
    response: Response,
    resource: &'static str,
    id: &str,
    context: &str,
) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::NOT_FOUND => CatalogError::NotFound {
            resource,
            id: id.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => CatalogError::RateLimited {
            retry_after_secs: response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map_or(2, |secs| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let secs = secs.ceil().max(0.0) as u64;
                    secs
                }),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CatalogError::Auth {
            status: status.as_u16(),
        },
        StatusCode::UNPROCESSABLE_ENTITY => CatalogError::Rejected {
            context: context.to_string(),
            message: response.text().await.unwrap_or_default(),
        },
        _ => CatalogError::UnexpectedStatus {
            status: status.as_u16(),
            context: context.to_string(),
        },
    })
}

#[async_trait]
impl CatalogApi for ShopifyAdminClient {
    async fn get_product(&self, id: i64) -> Result<CatalogProduct, CatalogError> {
        let mut url = self.url(&format!("products/{id}.json"))?;
        url.query_pairs_mut()
            .append_pair("fields", "id,title,status,variants");
        let envelope: ProductEnvelope = self
            .send_json(Method::GET, url, None, "product", &id.to_string())
            .await?;
        Ok(envelope.product.into_catalog())
    }

    async fn find_product_by_sku(
        &self,
        sku: &str,
    ) -> Result<Option<CatalogProduct>, CatalogError> {
        let url = self.url("graphql.json")?;
        let body = json!({
            "query": VARIANT_BY_SKU_QUERY,
            "variables": { "q": format!("sku:{sku}") },
        });
        let parsed: GraphqlResponse<VariantsBySku> = self
            .send_json(Method::POST, url, Some(&body), "variant", sku)
            .await?;

        if !parsed.errors.is_empty() {
            return Err(CatalogError::Rejected {
                context: format!("productVariants(sku:{sku})"),
                message: parsed
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }

        // Shopify's search is fuzzy; only an exact SKU counts.
        Ok(parsed
            .data
            .into_iter()
            .flat_map(|d| d.product_variants.edges)
            .map(|e| e.node)
            .filter(|n| n.sku.as_deref() == Some(sku))
            .find_map(crate::types::VariantNode::into_catalog))
    }

    async fn create_product(
        &self,
        draft: &ProductDraft,
        status: CatalogStatus,
    ) -> Result<CatalogProduct, CatalogError> {
        let url = self.url("products.json")?;
        let mut product = Self::product_body(draft, None);
        product["status"] = json!(status.as_str());
        let body = json!({ "product": product });
        let envelope: ProductEnvelope = self
            .send_json(Method::POST, url, Some(&body), "product", &draft.sku)
            .await?;
        tracing::info!(
            product_id = envelope.product.id,
            sku = %draft.sku,
            status = status.as_str(),
            "Shopify product created"
        );
        Ok(envelope.product.into_catalog())
    }

    async fn update_product(
        &self,
        id: i64,
        draft: &ProductDraft,
    ) -> Result<CatalogProduct, CatalogError> {
        // Updating the existing variant in place keeps its inventory item.
        let current = self.get_product(id).await?;
        let url = self.url(&format!("products/{id}.json"))?;
        let mut product = Self::product_body(draft, current.variant_id);
        product["id"] = json!(id);
        let body = json!({ "product": product });
        let envelope: ProductEnvelope = self
            .send_json(Method::PUT, url, Some(&body), "product", &id.to_string())
            .await?;
        Ok(envelope.product.into_catalog())
    }

    async fn set_product_status(
        &self,
        id: i64,
        status: CatalogStatus,
    ) -> Result<(), CatalogError> {
        let url = self.url(&format!("products/{id}.json"))?;
        let body = json!({ "product": { "id": id, "status": status.as_str() } });
        self.send(Method::PUT, url, Some(&body), "product", &id.to_string())
            .await?;
        Ok(())
    }

    async fn set_affiliate_link(&self, id: i64, link: &str) -> Result<(), CatalogError> {
        let url = self.url(&format!("products/{id}/metafields.json"))?;
        let body = json!({
            "metafield": {
                "namespace": AFFILIATE_NAMESPACE,
                "key": AFFILIATE_KEY,
                "type": "url",
                "value": link,
            }
        });
        self.send(Method::POST, url, Some(&body), "product", &id.to_string())
            .await?;
        Ok(())
    }

    async fn ensure_collection(&self, title: &str) -> Result<i64, CatalogError> {
        let mut url = self.url("custom_collections.json")?;
        url.query_pairs_mut().append_pair("title", title);
        let existing: CustomCollectionsEnvelope = self
            .send_json(Method::GET, url, None, "collection", title)
            .await?;
        if let Some(found) = existing
            .custom_collections
            .into_iter()
            .find(|c| c.title == title)
        {
            return Ok(found.id);
        }

        let url = self.url("custom_collections.json")?;
        let body = json!({ "custom_collection": { "title": title, "published": false } });
        let created: CustomCollectionEnvelope = self
            .send_json(Method::POST, url, Some(&body), "collection", title)
            .await?;
        tracing::info!(
            collection_id = created.custom_collection.id,
            title,
            "Shopify collection created"
        );
        Ok(created.custom_collection.id)
    }

    async fn add_to_collection(
        &self,
        product_id: i64,
        collection_id: i64,
    ) -> Result<(), CatalogError> {
        let url = self.url("collects.json")?;
        let body = json!({ "collect": { "product_id": product_id, "collection_id": collection_id } });
        match self
            .send(Method::POST, url, Some(&body), "collection", &collection_id.to_string())
            .await
        {
            Ok(_) => Ok(()),
            Err(CatalogError::Rejected { message, .. }) if message.contains("already") => {
                tracing::debug!(product_id, collection_id, "product already in collection");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn available_quantity(
        &self,
        inventory_item_id: i64,
    ) -> Result<Option<i64>, CatalogError> {
        let mut url = self.url("inventory_levels.json")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("inventory_item_ids", &inventory_item_id.to_string());
            if let Some(location_id) = self.location_id {
                pairs.append_pair("location_ids", &location_id.to_string());
            }
        }
        let levels: InventoryLevelsEnvelope = self
            .send_json(
                Method::GET,
                url,
                None,
                "inventory item",
                &inventory_item_id.to_string(),
            )
            .await?;
        Ok(levels
            .inventory_levels
            .into_iter()
            .find(|l| l.inventory_item_id == inventory_item_id)
            .and_then(|l| l.available))
    }

    async fn set_available_quantity(
        &self,
        inventory_item_id: i64,
        quantity: i64,
    ) -> Result<(), CatalogError> {
        let Some(location_id) = self.location_id else {
            return Err(CatalogError::Rejected {
                context: "inventory_levels/set".to_string(),
                message: "no SHOPIFY_LOCATION_ID configured".to_string(),
            });
        };
        let url = self.url("inventory_levels/set.json")?;
        let body = json!({
            "location_id": location_id,
            "inventory_item_id": inventory_item_id,
            "available": quantity,
        });
        self.send(
            Method::POST,
            url,
            Some(&body),
            "inventory item",
            &inventory_item_id.to_string(),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn client(store: &str) -> ShopifyAdminClient {
        ShopifyAdminClient::new(store, "tok", "2024-10", None, &ShopifySettings::default())
            .expect("client")
    }

    #[test]
    fn bare_store_domain_gets_https_scheme() {
        let c = client("trail-co.myshopify.com/");
        assert_eq!(
            c.url("products/1.json").unwrap().as_str(),
            "https://trail-co.myshopify.com/admin/api/2024-10/products/1.json"
        );
    }

    #[test]
    fn product_body_carries_variant_and_image() {
        let draft = ProductDraft {
            title: "Boot".into(),
            body_html: "<p>x</p>".into(),
            vendor: "Trail Co".into(),
            product_type: "Footwear".into(),
            sku: "trail-co-cj-42".into(),
            price: Decimal::new(9900, 2),
            compare_at_price: Some(Decimal::new(12999, 2)),
            image_url: "https://cdn.example.com/boot.jpg".into(),
            tags: vec!["Footwear".into(), "source:cj".into()],
        };
        let body = ShopifyAdminClient::product_body(&draft, Some(77));
        assert_eq!(body["variants"][0]["id"], 77);
        assert_eq!(body["variants"][0]["price"], "99.00");
        assert_eq!(body["variants"][0]["compare_at_price"], "129.99");
        assert_eq!(body["images"][0]["src"], "https://cdn.example.com/boot.jpg");
        assert_eq!(body["tags"], "Footwear, source:cj");
    }
}

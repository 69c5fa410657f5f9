use super::{DataStore, StoreConfig, StoreError};
use crate::api_client::{filter_literal, ApiClient, ApiError};
use crate::model::{Collection, Record};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};

const PER_PAGE: usize = 200;

/// Keys every hosted record carries that are not part of our data model.
const SYSTEM_KEYS: &[&str] = &["collectionId", "collectionName", "created", "updated", "expand"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    items: Vec<Value>,
}

pub struct PocketBaseStore {
    client: ApiClient,
}

impl PocketBaseStore {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Config("pocketbase store requires url".into()))?;
        if config.timeout_secs == Some(0) {
            return Err(StoreError::Config("timeout must be greater than zero".into()));
        }
        let mut client = ApiClient::new(url, config.timeout()).map_err(StoreError::Api)?;
        match (&config.admin_email, &config.admin_password) {
            (Some(email), Some(password)) => {
                client
                    .authenticate_admin(email, password)
                    .map_err(StoreError::Api)?;
            }
            (None, None) => {
                tracing::warn!(url, "no admin credentials; writes may be refused");
            }
            _ => {
                return Err(StoreError::Config(
                    "admin email and password must be given together".into(),
                ))
            }
        }
        tracing::debug!(url, authenticated = client.is_authenticated(), "pocketbase client ready");
        Ok(Self { client })
    }

    fn records_path(collection: Collection) -> String {
        format!("/api/collections/{}/records", collection.as_str())
    }

    fn record_path(collection: Collection, id: &str) -> String {
        format!("{}/{}", Self::records_path(collection), id)
    }

    fn map_err(collection: Collection, e: ApiError) -> StoreError {
        match e {
            ApiError::NotFound(what) => StoreError::not_found(collection, what),
            ApiError::Status {
                status: 400, message, ..
            } => StoreError::rejected(collection, message),
            other => StoreError::Api(other),
        }
    }

    fn send(
        &self,
        collection: Collection,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, StoreError> {
        self.client
            .request_query(method, path, query, body)
            .map_err(|e| Self::map_err(collection, e))
    }
}

/// Page to request after `page_no`, or `None` once the listing is exhausted.
fn next_page(page_no: u32, fetched: usize, total_pages: u32) -> Option<u32> {
    (fetched > 0 && page_no < total_pages).then_some(page_no + 1)
}

/// Hosted record JSON -> `Record`, dropping system keys.
fn into_record(collection: Collection, value: Value) -> Result<Record, StoreError> {
    let Value::Object(mut fields) = value else {
        return Err(StoreError::rejected(collection, "record is not a JSON object"));
    };
    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        _ => return Err(StoreError::rejected(collection, "record has no id")),
    };
    for key in SYSTEM_KEYS {
        fields.remove(*key);
    }
    Ok(Record::new(id, fields))
}

impl DataStore for PocketBaseStore {
    fn describe(&self) -> String {
        format!("pocketbase:{}", self.client.base_url())
    }

    fn create(&mut self, collection: Collection, fields: &Map<String, Value>) -> Result<Record, StoreError> {
        let mut body = fields.clone();
        body.remove("id");
        let v = self.send(
            collection,
            Method::POST,
            &Self::records_path(collection),
            &[],
            Some(&Value::Object(body)),
        )?;
        into_record(collection, v)
    }

    fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Record, StoreError> {
        let mut body = patch.clone();
        body.remove("id");
        let v = self.send(
            collection,
            Method::PATCH,
            &Self::record_path(collection, id),
            &[],
            Some(&Value::Object(body)),
        )?;
        into_record(collection, v)
    }

    fn find_first(&self, collection: Collection, field: &str, value: &str) -> Result<Record, StoreError> {
        if field == "id" {
            let v = self.send(collection, Method::GET, &Self::record_path(collection, value), &[], None)?;
            return into_record(collection, v);
        }
        let query = [
            ("filter", format!("{}={}", field, filter_literal(value))),
            ("perPage", "1".to_string()),
            ("skipTotal", "1".to_string()),
        ];
        let v = self.send(collection, Method::GET, &Self::records_path(collection), &query, None)?;
        let page: ListPage = serde_json::from_value(v).map_err(|e| StoreError::rejected(collection, e.to_string()))?;
        match page.items.into_iter().next() {
            Some(item) => into_record(collection, item),
            None => Err(StoreError::not_found(collection, format!("{field}={value}"))),
        }
    }

    fn list_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let mut out = Vec::new();
        let mut page_no = 1u32;
        loop {
            let query = [
                ("page", page_no.to_string()),
                ("perPage", PER_PAGE.to_string()),
            ];
            let v = self.send(collection, Method::GET, &Self::records_path(collection), &query, None)?;
            let page: ListPage =
                serde_json::from_value(v).map_err(|e| StoreError::rejected(collection, e.to_string()))?;
            let fetched = page.items.len();
            for item in page.items {
                out.push(into_record(collection, item)?);
            }
            tracing::debug!(collection = %collection, page = page_no, fetched, "listed page");
            match next_page(page_no, fetched, page.total_pages) {
                Some(next) => page_no = next,
                None => break,
            }
        }
        Ok(out)
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.send(collection, Method::DELETE, &Self::record_path(collection, id), &[], None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::stub;
    use crate::store::StoreKind;
    use serde_json::json;

    fn stub_config(url: &str) -> StoreConfig {
        let mut c = StoreConfig::new(StoreKind::PocketBase);
        c.url = Some(url.to_string());
        c.timeout_secs = Some(5);
        c
    }

    fn item(id: &str, name: &str) -> Value {
        json!({"id": id, "collectionId": "c1", "collectionName": "pis", "created": "", "updated": "", "name": name})
    }

    #[test]
    fn system_keys_are_dropped_from_records() {
        let r = into_record(
            Collection::Pis,
            json!({
                "id": "abc",
                "collectionId": "x",
                "collectionName": "pis",
                "created": "2025-01-01 00:00:00.000Z",
                "updated": "2025-01-01 00:00:00.000Z",
                "name": "Smith"
            }),
        )
        .unwrap();
        assert_eq!(r.id, "abc");
        assert_eq!(r.fields.len(), 1);
        assert_eq!(r.str_field("name"), Some("Smith"));
    }

    #[test]
    fn records_without_id_are_rejected() {
        assert!(into_record(Collection::Files, json!({"db_no": "1"})).is_err());
        assert!(into_record(Collection::Files, json!([1, 2])).is_err());
    }

    #[test]
    fn list_page_tolerates_missing_fields() {
        let p: ListPage = serde_json::from_value(json!({"page": 1, "items": []})).unwrap();
        assert_eq!(p.total_pages, 0);
    }

    #[test]
    fn half_supplied_credentials_are_a_config_error() {
        let mut c = StoreConfig::new(StoreKind::PocketBase);
        c.url = Some("http://127.0.0.1:9".into());
        c.admin_email = Some("a@b".into());
        assert!(matches!(PocketBaseStore::open(&c), Err(StoreError::Config(_))));
    }

    #[test]
    fn zero_timeout_is_a_config_error() {
        let mut c = stub_config("http://127.0.0.1:9");
        c.timeout_secs = Some(0);
        assert!(matches!(PocketBaseStore::open(&c), Err(StoreError::Config(_))));
    }

    #[test]
    fn write_errors_map_to_store_errors() {
        let e = PocketBaseStore::map_err(
            Collection::Pis,
            ApiError::Status {
                status: 400,
                path: "/p".into(),
                message: "Failed to create record.".into(),
                body: None,
            },
        );
        assert!(matches!(e, StoreError::Rejected { .. }));
        assert!(PocketBaseStore::map_err(Collection::Pis, ApiError::NotFound("x".into())).is_not_found());
    }

    #[test]
    fn paging_stops_at_last_or_empty_page() {
        assert_eq!(next_page(1, 200, 3), Some(2));
        assert_eq!(next_page(3, 17, 3), None);
        assert_eq!(next_page(1, 0, 5), None);
        // Servers that omit totalPages yield a single page.
        assert_eq!(next_page(1, 200, 0), None);
    }

    #[test]
    fn list_all_reads_every_page() {
        let server = stub::serve(2, |req| {
            let page = if req.line.contains("page=2") {
                json!({"page": 2, "perPage": 200, "totalPages": 2, "items": [item("p3", "Lee")]})
            } else {
                json!({"page": 1, "perPage": 200, "totalPages": 2, "items": [item("p1", "Smith"), item("p2", "Doe")]})
            };
            (200, page.to_string())
        });
        let store = PocketBaseStore::open(&stub_config(&server.url)).unwrap();
        let records = store.list_all(Collection::Pis).unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        assert!(records.iter().all(|r| r.fields.len() == 1));
        let seen = server.requests();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].line.starts_with("GET /api/collections/pis/records?"));
        assert!(seen.iter().all(|r| r.line.contains("perPage=200")));
        assert!(seen[1].line.contains("page=2"));
    }

    #[test]
    fn credentials_log_in_before_writes() {
        let server = stub::serve(2, |req| {
            if req.line.starts_with("POST /api/admins/auth-with-password") {
                (200, json!({"token": "admin-token"}).to_string())
            } else {
                (200, item("p9", "Smith").to_string())
            }
        });
        let mut c = stub_config(&server.url);
        c.admin_email = Some("admin@example.org".into());
        c.admin_password = Some("secret".into());
        let mut store = PocketBaseStore::open(&c).unwrap();

        let mut fields = Map::new();
        fields.insert("id".into(), json!("client-chosen"));
        fields.insert("name".into(), json!("Smith"));
        let r = store.create(Collection::Pis, &fields).unwrap();
        assert_eq!(r.id, "p9");

        let seen = server.requests();
        assert!(seen[1].line.starts_with("POST /api/collections/pis/records "));
        assert_eq!(seen[1].authorization.as_deref(), Some("admin-token"));
        let sent: Value = serde_json::from_str(&seen[1].body).unwrap();
        assert_eq!(sent, json!({"name": "Smith"}));
    }

    #[test]
    fn refused_login_fails_open() {
        let server = stub::serve(1, |_| {
            (400, json!({"code": 400, "message": "Failed to authenticate.", "data": {}}).to_string())
        });
        let mut c = stub_config(&server.url);
        c.admin_email = Some("admin@example.org".into());
        c.admin_password = Some("wrong".into());
        assert!(matches!(
            PocketBaseStore::open(&c),
            Err(StoreError::Api(ApiError::Auth(_)))
        ));
    }

    #[test]
    fn refused_create_is_rejected() {
        let server = stub::serve(1, |_| {
            let body = json!({
                "code": 400,
                "message": "Failed to create record.",
                "data": {"db_no": {"code": "validation_not_unique"}}
            });
            (400, body.to_string())
        });
        let mut store = PocketBaseStore::open(&stub_config(&server.url)).unwrap();
        let mut fields = Map::new();
        fields.insert("db_no".into(), json!("DB 1"));
        match store.create(Collection::Files, &fields) {
            Err(e @ StoreError::Rejected { .. }) => {
                assert!(e.to_string().contains("Failed to create record."))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn find_first_without_match_is_not_found() {
        let server = stub::serve(1, |_| (200, json!({"page": 1, "perPage": 1, "items": []}).to_string()));
        let store = PocketBaseStore::open(&stub_config(&server.url)).unwrap();
        let err = store.find_first(Collection::Sponsors, "name", "NSF").unwrap_err();
        assert!(err.is_not_found());
        let seen = server.requests();
        assert!(seen[0].line.contains("perPage=1"));
        assert!(seen[0].line.contains("filter="));
    }
}

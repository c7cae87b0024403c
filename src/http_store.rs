// ===============================
// src/http_store.rs
// ===============================
//
// REST client for the ledger API (reqwest). Implements both the record
// stores and the aggregate query service for a dashboard session.
//
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Duration;
use url::Url;

use crate::domain::{
    AggregationSnapshot, CategoryRecord, LedgerCategory, LoanRecord, MonthlyReport, NewLoan,
    NewMonthlyReport, NewRecord, PeriodKey,
};
use crate::error::StoreError;
use crate::gate::{OperatorCredentials, OPERATOR_HEADER, TOKEN_HEADER};
use crate::store::{AggregateQuery, RecordStore, LOANS, REPORTS};

pub struct HttpLedger {
    http: reqwest::Client,
    base: Url,
    credentials: Option<OperatorCredentials>,
}

impl HttpLedger {
    pub fn new(
        api_base: &str,
        timeout: Duration,
        credentials: Option<OperatorCredentials>,
    ) -> Result<Self, StoreError> {
        // join() drops the last segment unless the base ends with '/'
        let base = Url::parse(&format!("{}/", api_base.trim_end_matches('/')))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base, credentials })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Ok(self.base.join(&path)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.credentials {
            Some(c) => req.header(OPERATOR_HEADER, &c.operator).header(TOKEN_HEADER, &c.token),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, resource: &'static str) -> Result<T, StoreError> {
        let rsp = self.request(Method::GET, url).send().await?;
        read_json(rsp, resource, "").await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
        resource: &'static str,
    ) -> Result<T, StoreError> {
        let rsp = self.request(Method::POST, url).json(body).send().await?;
        read_json(rsp, resource, "").await
    }

    async fn delete(&self, segments: &[&str], resource: &'static str, id: &str) -> Result<(), StoreError> {
        let rsp = self.request(Method::DELETE, self.url(segments)?).send().await?;
        check_status(rsp, resource, id).await.map(|_| ())
    }
}

async fn check_status(rsp: Response, resource: &'static str, id: &str) -> Result<Response, StoreError> {
    match rsp.status() {
        s if s.is_success() => Ok(rsp),
        StatusCode::NOT_FOUND => Err(StoreError::NotFound { resource, id: id.to_string() }),
        StatusCode::UNAUTHORIZED => Err(StoreError::Unauthorized),
        s => {
            let body = rsp.text().await.unwrap_or_default();
            Err(StoreError::Status { status: s.as_u16(), body })
        }
    }
}

async fn read_json<T: DeserializeOwned>(rsp: Response, resource: &'static str, id: &str) -> Result<T, StoreError> {
    let rsp = check_status(rsp, resource, id).await?;
    let text = rsp.text().await?;
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl RecordStore for HttpLedger {
    async fn create_entry(&self, category: LedgerCategory, record: &NewRecord) -> Result<CategoryRecord, StoreError> {
        self.post(self.url(&[category.slug()])?, record, category.slug()).await
    }

    async fn list_entries(&self, category: LedgerCategory, period: PeriodKey) -> Result<Vec<CategoryRecord>, StoreError> {
        let mut url = self.url(&[category.slug()])?;
        url.query_pairs_mut().append_pair("period", &period.to_string());
        self.get(url, category.slug()).await
    }

    async fn delete_entry(&self, category: LedgerCategory, id: &str) -> Result<(), StoreError> {
        self.delete(&[category.slug(), id], category.slug(), id).await
    }

    async fn create_loan(&self, loan: &NewLoan) -> Result<LoanRecord, StoreError> {
        self.post(self.url(&[LOANS])?, loan, LOANS).await
    }

    async fn list_loans(&self) -> Result<Vec<LoanRecord>, StoreError> {
        self.get(self.url(&[LOANS])?, LOANS).await
    }

    async fn delete_loan(&self, id: &str) -> Result<(), StoreError> {
        self.delete(&[LOANS, id], LOANS, id).await
    }

    async fn create_report(&self, report: &NewMonthlyReport) -> Result<MonthlyReport, StoreError> {
        self.post(self.url(&[REPORTS])?, report, REPORTS).await
    }

    async fn list_reports(&self) -> Result<Vec<MonthlyReport>, StoreError> {
        self.get(self.url(&[REPORTS])?, REPORTS).await
    }

    async fn delete_report(&self, id: &str) -> Result<(), StoreError> {
        self.delete(&[REPORTS, id], REPORTS, id).await
    }
}

#[async_trait]
impl AggregateQuery for HttpLedger {
    async fn compute_snapshot(&self, period: PeriodKey) -> Result<AggregationSnapshot, StoreError> {
        let key = period.to_string();
        self.get(self.url(&["aggregate", &key])?, "aggregate").await
    }
}

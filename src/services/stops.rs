use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{
    client::ApiClient,
    error::Result,
    models::{
        photo::UploadFile,
        stop::{
            BusStop, ChangeLogEntry, CustomFieldUpdate, DistrictsResponse, ImportResult,
            InspectionResult, NewStop, StopPatch, StopStats, StopsPage, StopsQuery,
        },
        user::MessageResponse,
    },
};

#[derive(Serialize)]
struct InspectionQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    next_inspection_date: Option<NaiveDateTime>,
}

pub struct StopService;

impl StopService {
    /// One server-filtered page.
    pub async fn list(client: &ApiClient, query: &StopsQuery) -> Result<StopsPage> {
        client.get_with_query("/stops", query).await
    }

    /// The whole inventory, unpaginated.
    pub async fn all(client: &ApiClient) -> Result<Vec<BusStop>> {
        client.get("/stops/all").await
    }

    /// `key` is either the numeric id or the stop code.
    pub async fn get(client: &ApiClient, key: &str) -> Result<BusStop> {
        client.get(&format!("/stops/{key}")).await
    }

    pub async fn create(client: &ApiClient, stop: &NewStop) -> Result<BusStop> {
        client.post("/stops", stop).await
    }

    pub async fn update(client: &ApiClient, key: &str, patch: &StopPatch) -> Result<BusStop> {
        client.put(&format!("/stops/{key}"), patch).await
    }

    pub async fn delete(client: &ApiClient, key: &str) -> Result<()> {
        client.delete(&format!("/stops/{key}")).await
    }

    pub async fn stats(client: &ApiClient) -> Result<StopStats> {
        client.get("/stops/stats").await
    }

    pub async fn history(client: &ApiClient, key: &str) -> Result<Vec<ChangeLogEntry>> {
        client.get(&format!("/stops/{key}/history")).await
    }

    pub async fn districts(client: &ApiClient) -> Result<Vec<String>> {
        let res: DistrictsResponse = client.get("/stops/districts").await?;
        Ok(res.districts)
    }

    pub async fn record_inspection(
        client: &ApiClient,
        key: &str,
        next_inspection_date: Option<NaiveDateTime>,
    ) -> Result<InspectionResult> {
        let query = InspectionQuery { next_inspection_date };
        client
            .post_with_query(&format!("/stops/{key}/inspection"), &query)
            .await
    }

    pub async fn update_custom_fields(
        client: &ApiClient,
        key: &str,
        values: &[CustomFieldUpdate],
    ) -> Result<MessageResponse> {
        client.put(&format!("/stops/{key}/custom-fields"), values).await
    }

    /// Bulk import from an xlsx or csv sheet.
    pub async fn import(client: &ApiClient, file: &UploadFile) -> Result<ImportResult> {
        client.upload("/stops/import", &[], &[("file", file)]).await
    }
}

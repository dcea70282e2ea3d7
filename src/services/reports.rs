use bytes::Bytes;
use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    client::ApiClient,
    error::Result,
    models::report::{AuditLogPage, AuditLogQuery, DashboardStats, ReportFilter, ReportFormat},
};

#[derive(Serialize)]
struct ExportQuery<'a> {
    format: ReportFormat,
    #[serde(flatten)]
    filter: &'a ReportFilter,
}

pub struct ReportService;

impl ReportService {
    pub async fn dashboard(client: &ApiClient) -> Result<DashboardStats> {
        client.get("/reports/dashboard").await
    }

    /// Raw spreadsheet bytes for the filtered inventory.
    pub async fn export(client: &ApiClient, format: ReportFormat, filter: &ReportFilter) -> Result<Bytes> {
        client
            .get_bytes("/reports/export", &ExportQuery { format, filter })
            .await
    }

    /// `bus_stops_report_YYYY-MM-DD.<ext>`
    pub fn export_file_name(format: ReportFormat, date: NaiveDate) -> String {
        format!("bus_stops_report_{}.{}", date.format("%Y-%m-%d"), format.extension())
    }

    pub async fn audit_log(client: &ApiClient, query: &AuditLogQuery) -> Result<AuditLogPage> {
        client.get_with_query("/reports/audit-log", query).await
    }
}

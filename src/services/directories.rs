use crate::{
    client::ApiClient,
    error::Result,
    models::directory::{District, DistrictPatch, NewDistrict, NewRoute, Route, RoutePatch},
};

/// Reference lists of districts and routes used by the stop forms.
pub struct DirectoryService;

impl DirectoryService {
    pub async fn districts(client: &ApiClient) -> Result<Vec<District>> {
        client.get("/directories/districts").await
    }

    pub async fn create_district(client: &ApiClient, req: &NewDistrict) -> Result<District> {
        client.post("/directories/districts", req).await
    }

    pub async fn update_district(client: &ApiClient, id: i64, patch: &DistrictPatch) -> Result<District> {
        client.put(&format!("/directories/districts/{id}"), patch).await
    }

    pub async fn delete_district(client: &ApiClient, id: i64) -> Result<()> {
        client.delete(&format!("/directories/districts/{id}")).await
    }

    pub async fn routes(client: &ApiClient) -> Result<Vec<Route>> {
        client.get("/directories/routes").await
    }

    pub async fn create_route(client: &ApiClient, req: &NewRoute) -> Result<Route> {
        client.post("/directories/routes", req).await
    }

    pub async fn update_route(client: &ApiClient, id: i64, patch: &RoutePatch) -> Result<Route> {
        client.put(&format!("/directories/routes/{id}"), patch).await
    }

    pub async fn delete_route(client: &ApiClient, id: i64) -> Result<()> {
        client.delete(&format!("/directories/routes/{id}")).await
    }
}

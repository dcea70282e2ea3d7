use crate::{
    client::ApiClient,
    error::Result,
    models::{
        photo::{MultipleUploadResult, Photo, UploadFile},
        user::MessageResponse,
    },
};

pub struct PhotoService;

impl PhotoService {
    pub async fn upload(
        client: &ApiClient,
        stop_key: &str,
        file: &UploadFile,
        is_main: bool,
    ) -> Result<Photo> {
        client
            .upload(
                &format!("/photos/upload/{stop_key}"),
                &[("is_main", is_main.to_string())],
                &[("file", file)],
            )
            .await
    }

    /// Upload several files in one request. Per-file failures come back in
    /// the result rather than as an error.
    pub async fn upload_many(
        client: &ApiClient,
        stop_key: &str,
        files: &[UploadFile],
    ) -> Result<MultipleUploadResult> {
        let parts: Vec<(&str, &UploadFile)> = files.iter().map(|f| ("files", f)).collect();
        client
            .upload(&format!("/photos/upload/{stop_key}/multiple"), &[], &parts)
            .await
    }

    pub async fn set_main(client: &ApiClient, photo_id: i64) -> Result<MessageResponse> {
        client.put_empty(&format!("/photos/{photo_id}/set-main")).await
    }

    pub async fn delete(client: &ApiClient, photo_id: i64) -> Result<()> {
        client.delete(&format!("/photos/{photo_id}")).await
    }

    pub async fn list_for_stop(client: &ApiClient, stop_key: &str) -> Result<Vec<Photo>> {
        client.get(&format!("/photos/stop/{stop_key}")).await
    }
}

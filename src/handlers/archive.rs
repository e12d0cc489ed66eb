use crate::{
    error::{AppError, AppResult},
    state::AppState,
};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Metadata for one archived merged track.
pub async fn get_archived_audio(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let file_id = path.into_inner();
    let metadata = state
        .archive
        .retrieve_metadata(&file_id)
        .ok_or_else(|| AppError::NotFound(format!("Archived audio '{}' not found", file_id)))?;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "archive": metadata
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::storage::AudioArchive;
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, test as actix_test, App};

    #[actix_web::test]
    async fn test_archived_audio_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.storage_path = dir.path().display().to_string();
        config.initialize_storage().unwrap();

        let state = AppState::new(config);
        let source = dir.path().join("merged.wav");
        std::fs::write(&source, b"RIFF").unwrap();
        let reference = state
            .archive
            .archive(&source, "room-1", &["alice".to_string()])
            .await
            .unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/archive/{file_id}", web::get().to(get_archived_audio)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri(&format!("/archive/{}", reference.file_id))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["archive"]["call_session_id"], "room-1");
        assert_eq!(body["archive"]["participant_ids"][0], "alice");

        let req = actix_test::TestRequest::get().uri("/archive/unknown").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

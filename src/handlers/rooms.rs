use crate::{
    error::{AppError, AppResult},
    state::AppState,
};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// List every live room with its stream handlers.
pub async fn list_rooms(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let rooms = state.recording.registry().snapshot();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "count": rooms.len(),
        "rooms": rooms
    })))
}

pub async fn get_room(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let room_id = path.into_inner();
    let room = state
        .recording
        .registry()
        .get(&room_id)
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' not found", room_id)))?;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "room": room.snapshot(),
        "participant_ids": room.participant_ids()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, test as actix_test, App};

    #[actix_web::test]
    async fn test_list_and_get_rooms() {
        let state = AppState::new(AppConfig::default());
        state.recording.connect("room-1", "alice").await.unwrap();
        state.recording.connect("room-1", "bob").await.unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/rooms", web::get().to(list_rooms))
                .route("/rooms/{room_id}", web::get().to(get_room)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/rooms").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["rooms"][0]["state"], "active");
        assert_eq!(body["rooms"][0]["handlers"][1]["client_id"], "bob");
        assert_eq!(body["rooms"][0]["handlers"][1]["generation"], 1);

        let req = actix_test::TestRequest::get().uri("/rooms/room-1").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["participant_ids"], json!(["alice", "bob"]));

        let req = actix_test::TestRequest::get().uri("/rooms/missing").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

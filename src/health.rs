use crate::recording::registry::RoomStatus;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let registry = state.recording.registry();
    let stats = state.recording.stats();
    let active_rooms = registry.room_count();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "audio-assurance-monitor",
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host,
            "port": state.config.server.port
        },
        "recording": {
            "active_rooms": active_rooms,
            "active_streams": registry.active_stream_count(),
            "rooms_archived": stats.rooms_archived,
            "rooms_without_audio": stats.rooms_without_audio,
            "rooms_failed": stats.rooms_failed
        },
        "system": get_system_status(active_rooms, state.config.performance.max_rooms)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let rooms = state.recording.registry().snapshot();
    let count_in = |status: RoomStatus| rooms.iter().filter(|room| room.state == status).count();
    let buffered_bytes: usize = rooms
        .iter()
        .flat_map(|room| room.handlers.iter())
        .map(|handler| handler.total_bytes)
        .sum();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "finalize": state.recording.stats(),
        "rooms": {
            "total": rooms.len(),
            "active": count_in(RoomStatus::Active),
            "draining": count_in(RoomStatus::Draining),
            "processing": count_in(RoomStatus::Processing),
            "max_rooms": state.config.performance.max_rooms
        },
        "streams": {
            "total": rooms.iter().map(|room| room.handlers.len()).sum::<usize>(),
            "active": state.recording.registry().active_stream_count(),
            "buffered_bytes": buffered_bytes
        },
        "archive": {
            "archived_files": state.archive.archived_count()
        },
        "memory": get_memory_info()
    }))
}

/// Resident and virtual memory of this process, read from `/proc` on Linux.
fn get_memory_info() -> serde_json::Value {
    let status = std::fs::read_to_string(format!("/proc/{}/status", process::id()));

    match status {
        Ok(status) => {
            let field_bytes = |name: &str| -> u64 {
                status
                    .lines()
                    .find(|line| line.starts_with(name))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map(|kb| kb * 1024)
                    .unwrap_or(0)
            };
            json!({
                "resident_memory_bytes": field_bytes("VmRSS:"),
                "virtual_memory_bytes": field_bytes("VmSize:"),
                "available": true
            })
        }
        Err(_) => json!({
            "resident_memory_bytes": 0,
            "virtual_memory_bytes": 0,
            "available": false,
            "note": "Memory info not available on this platform"
        }),
    }
}

fn get_system_status(active_rooms: usize, max_rooms: usize) -> serde_json::Value {
    let room_usage = if max_rooms > 0 {
        active_rooms as f64 / max_rooms as f64
    } else {
        0.0
    };

    let status = if room_usage > 0.9 {
        "high_load"
    } else if room_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "room_usage_percent": (room_usage * 100.0).round(),
        "max_rooms": max_rooms,
        "current_rooms": active_rooms,
        "load_warnings": if room_usage > 0.8 {
            vec!["High room usage - consider increasing performance.max_rooms"]
        } else {
            vec![]
        }
    })
}

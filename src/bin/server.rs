use actix_web::{web, App, HttpServer, HttpResponse};
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use attitude_balancer::TelemetrySnapshot;
// the balancer pushes snapshots to this server, the display/recording side pulls them.
// history is a bounded ring so a long session can't grow memory without limit

pub const SERVER_ADDR: &str = "127.0.0.1:8080";
pub const HISTORY_LEN: usize = 600;

struct AppState {
    latest: Mutex<TelemetrySnapshot>,
    history: Mutex<VecDeque<TelemetrySnapshot>>,
}

impl AppState {
    fn new() -> Self {
        AppState {
            latest: Mutex::new(TelemetrySnapshot::default()),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }
}

fn poisoned() -> HttpResponse {
    HttpResponse::InternalServerError().body("state lock poisoned")
}

async fn set_telemetry(data: web::Json<TelemetrySnapshot>, app_data: web::Data<AppState>) -> HttpResponse {
    let snapshot = data.into_inner();
    {
        let mut history = match app_data.history.lock() {
            Ok(h) => h,
            Err(_) => return poisoned(),
        };
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(snapshot.clone());
    }
    match app_data.latest.lock() {
        Ok(mut latest) => {
            *latest = snapshot;
            HttpResponse::Ok().body("Telemetry set")
        }
        Err(_) => poisoned(),
    }
}

async fn get_telemetry(app_data: web::Data<AppState>) -> HttpResponse {
    match app_data.latest.lock() {
        Ok(latest) => HttpResponse::Ok().json(latest.clone()),
        Err(_) => poisoned(),
    }
}

async fn get_history(app_data: web::Data<AppState>) -> HttpResponse {
    match app_data.history.lock() {
        Ok(history) => HttpResponse::Ok().json(history.iter().collect::<Vec<_>>()),
        Err(_) => poisoned(),
    }
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/telemetry", web::get().to(get_telemetry))
        .route("/telemetry", web::post().to(set_telemetry))
        .route("/telemetry/history", web::get().to(get_history));
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let shared = web::Data::new(AppState::new());

    log::info!("telemetry server on {}", SERVER_ADDR);
    HttpServer::new(move || {
        App::new()
            .app_data(shared.clone())
            .configure(routes)
    })
    .bind(SERVER_ADDR)?
    .run()
    .await
}

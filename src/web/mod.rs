mod handlers;
mod routes;
mod rtc_ws;
mod ws;

pub use routes::create_router;
pub use rtc_ws::rtc_ws_handler;
pub use ws::ws_handler;

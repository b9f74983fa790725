mod handler;

pub use handler::ProxyHandler;

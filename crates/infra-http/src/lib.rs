// Requeue Infrastructure - HTTP Adapter
// Implements: RequestDispatcher (reqwest-backed replay client)

mod dispatcher;

pub use dispatcher::HttpDispatcher;

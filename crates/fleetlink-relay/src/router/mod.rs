//! WebSocket frame routing between agents and browser consoles.

pub mod agent;
pub mod browser;

#[cfg(test)]
mod agent_tests;

pub use agent::handle_agent_socket;
pub use browser::handle_browser_socket;

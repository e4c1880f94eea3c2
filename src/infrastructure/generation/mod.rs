//! Generation provider implementations

mod anthropic;
pub mod http_client;
mod openai;

pub use anthropic::AnthropicProvider;
pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::OpenAiProvider;

#[cfg(test)]
pub use http_client::mock::MockHttpClient;

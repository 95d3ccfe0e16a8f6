//! Provider configuration helpers: endpoint/key/model resolution with
//! environment variable support.
//!
//! Generalizes the teacher's hardcoded `OPEN_AGENT_BASE_URL`/`OPEN_AGENT_MODEL`
//! pair (meant for a single local server) into a provider-prefixed scheme
//! (`<PROVIDER>_API_KEY`/`<PROVIDER>_BASE_URL`) so a caller can configure
//! several backends side by side, plus keeps the original `OPEN_AGENT_MODEL`
//! variable as a library-level default.

use std::env;
use std::str::FromStr;

/// A well-known remote or local backend this crate ships a default endpoint
/// for. Every variant carries its own env-var prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    Gemini,
    LmStudio,
    Ollama,
    LlamaCpp,
    Vllm,
}

impl Backend {
    /// The default base URL for this backend.
    pub fn default_url(&self) -> &'static str {
        match self {
            Backend::OpenAi => "https://api.openai.com/v1",
            Backend::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Backend::LmStudio => "http://localhost:1234/v1",
            Backend::Ollama => "http://localhost:11434/v1",
            Backend::LlamaCpp => "http://localhost:8080/v1",
            Backend::Vllm => "http://localhost:8000/v1",
        }
    }

    /// The environment variable prefix used to resolve this backend's
    /// `<PREFIX>_API_KEY`/`<PREFIX>_BASE_URL` overrides.
    fn env_prefix(&self) -> &'static str {
        match self {
            Backend::OpenAi => "OPENAI",
            Backend::Gemini => "GEMINI",
            Backend::LmStudio => "LMSTUDIO",
            Backend::Ollama => "OLLAMA",
            Backend::LlamaCpp => "LLAMACPP",
            Backend::Vllm => "VLLM",
        }
    }

    /// Resolves this backend's API key from `<PREFIX>_API_KEY`. Local
    /// servers (LM Studio, Ollama, llama.cpp, vLLM) typically need none, so
    /// an unset variable resolves to an empty string rather than an error.
    pub fn api_key(&self) -> String {
        env::var(format!("{}_API_KEY", self.env_prefix())).unwrap_or_default()
    }

    /// Resolves this backend's base URL: `<PREFIX>_BASE_URL` if set, else
    /// the backend's default.
    pub fn base_url(&self) -> String {
        env::var(format!("{}_BASE_URL", self.env_prefix())).unwrap_or_else(|_| self.default_url().to_string())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Backend::OpenAi),
            "gemini" => Ok(Backend::Gemini),
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Backend::LmStudio),
            "ollama" => Ok(Backend::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Backend::LlamaCpp),
            "vllm" => Ok(Backend::Vllm),
            _ => Err(format!("unknown backend: {s}")),
        }
    }
}

/// Resolves a base URL with the same priority order the teacher used:
/// an explicit per-backend environment override, then a known backend's
/// default, then a caller-supplied fallback.
pub fn get_base_url(backend: Option<Backend>, fallback: Option<&str>) -> String {
    if let Some(b) = backend {
        return b.base_url();
    }
    fallback.unwrap_or(Backend::LmStudio.default_url()).to_string()
}

/// Resolves a model name, optionally preferring the library-level
/// `OPEN_AGENT_MODEL` override over an explicit fallback.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var("OPEN_AGENT_MODEL") {
            return Some(model);
        }
    }
    fallback.map(str::to_string)
}

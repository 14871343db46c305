use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development against a
/// ComfyUI instance on the same machine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// Base URL of the ComfyUI HTTP API (default: `http://localhost:8188`).
    pub comfyui_api_url: String,
    /// Directory of `<kind>.json` workflow templates overriding the
    /// built-in ones. Unset means built-in templates only.
    pub workflow_dir: Option<PathBuf>,
    /// Seconds a finished job stays queryable (default: `3600`).
    pub job_retention_secs: u64,
    /// Seconds between retention sweeps (default: `60`).
    pub job_sweep_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `8000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `60`                       |
    /// | `COMFYUI_API_URL`         | `http://localhost:8188`    |
    /// | `WORKFLOW_DIR`            | unset                      |
    /// | `JOB_RETENTION_SECS`      | `3600`                     |
    /// | `JOB_SWEEP_INTERVAL_SECS` | `60`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let comfyui_api_url = std::env::var("COMFYUI_API_URL")
            .unwrap_or_else(|_| "http://localhost:8188".into());

        let workflow_dir = std::env::var("WORKFLOW_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let job_retention_secs: u64 = std::env::var("JOB_RETENTION_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("JOB_RETENTION_SECS must be a valid u64");

        let job_sweep_interval_secs: u64 = std::env::var("JOB_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("JOB_SWEEP_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            comfyui_api_url,
            workflow_dir,
            job_retention_secs,
            job_sweep_interval_secs,
        }
    }
}

//! Settings from the environment (`.env` honoured), overridable by flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use dataset::{CsvFormat, DataSource, DataSources};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Parser, Debug, Default)]
#[command(name = "api", about = "Serves SSP/DF occurrence statistics over HTTP")]
pub struct Args {
    /// Address to listen on (overrides API_BIND)
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory holding the CSV files (overrides DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for app.log (overrides LOG_DIR)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub title: String,
    pub version: String,
    pub data_dir: PathBuf,
    pub csv_consolidado: String,
    pub csv_natureza: String,
    pub csv_ra: String,
    pub encoding_consolidado: String,
    pub encoding_natureza: String,
    pub encoding_ra: String,
    pub cors_origins: String,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_env(args: &Args) -> Self {
        Self::from_lookup(args, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(args: &Args, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            bind: args
                .bind
                .clone()
                .unwrap_or_else(|| var("API_BIND", "127.0.0.1:8000")),
            title: var("API_TITLE", "API Dados de Segurança Pública SSP/DF"),
            version: var("API_VERSION", "1.0.0"),
            data_dir: args
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(var("DATA_DIR", "data"))),
            csv_consolidado: var("CSV_NAME_CONSOLIDADO", "dados_consolidados_normalizado.csv"),
            csv_natureza: var("CSV_NAME_NATUREZA", "tabela_natureza_ocorrencia.csv"),
            csv_ra: var("CSV_NAME_RA", "tabela_ra_ocorrencia.csv"),
            encoding_consolidado: var("CSV_ENCODING_CONSOLIDADO", "utf-8"),
            encoding_natureza: var("CSV_ENCODING_NATUREZA", "latin1"),
            encoding_ra: var("CSV_ENCODING_RA", "utf-8"),
            cors_origins: var("CORS_ORIGINS", "http://localhost:8000"),
            log_dir: args
                .log_dir
                .clone()
                .or_else(|| lookup("LOG_DIR").map(PathBuf::from)),
        }
    }

    pub fn data_sources(&self) -> Result<DataSources> {
        let source = |name: &str, label: &str| -> Result<DataSource> {
            let format = CsvFormat::with_encoding_label(label)
                .with_context(|| format!("Unknown encoding '{}' for {}", label, name))?;
            Ok(DataSource::new(self.data_dir.join(name), format))
        };

        Ok(DataSources {
            facts: source(&self.csv_consolidado, &self.encoding_consolidado)?,
            categories: source(&self.csv_natureza, &self.encoding_natureza)?,
            regions: source(&self.csv_ra, &self.encoding_ra)?,
        })
    }
}

/// `*` allows any origin; otherwise a comma-separated list of origins.
pub fn cors_layer(origins: &str) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{}'", o)))
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)], args: &Args) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(args, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[], &Args::default());
        assert_eq!(s.bind, "127.0.0.1:8000");
        assert_eq!(s.version, "1.0.0");
        assert_eq!(s.csv_natureza, "tabela_natureza_ocorrencia.csv");
        assert_eq!(s.encoding_natureza, "latin1");
        assert!(s.log_dir.is_none());

        let sources = s.data_sources().unwrap();
        assert_eq!(
            sources.facts.path,
            PathBuf::from("data/dados_consolidados_normalizado.csv")
        );
        assert_eq!(sources.categories.format.encoding, encoding_rs::WINDOWS_1252);
        assert_eq!(sources.regions.format.encoding, encoding_rs::UTF_8);
    }

    #[test]
    fn test_args_override_env() {
        let args = Args {
            bind: Some("0.0.0.0:9000".into()),
            data_dir: None,
            log_dir: Some(PathBuf::from("/tmp/logs")),
        };
        let s = settings(&[("API_BIND", "127.0.0.1:1"), ("DATA_DIR", "/srv/ssp")], &args);
        assert_eq!(s.bind, "0.0.0.0:9000");
        assert_eq!(s.data_dir, PathBuf::from("/srv/ssp"));
        assert_eq!(s.log_dir, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let s = settings(&[("CSV_ENCODING_RA", "ebcdic-klingon")], &Args::default());
        assert!(s.data_sources().is_err());
    }

    #[test]
    fn test_cors_origins() {
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("http://localhost:8000, https://ssp.df.gov.br").is_ok());
        assert!(cors_layer("http://bad\norigin").is_err());
    }
}

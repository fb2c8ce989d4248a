use serenity::model::id::RoleId;
use std::{fmt::Display, str::FromStr, time::Duration};
use tracing::warn;

use crate::{
    audio::selection::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT},
    error::{MusicError, MusicResult},
};

pub const DEFAULT_VOLUME: u16 = 50;
pub const DEFAULT_MAX_VOLUME: u16 = 150;
pub const VOLUME_CEILING: u16 = 1000;
pub const DEFAULT_SELECTION_TTL: Duration = Duration::from_secs(120);
pub const DEFAULT_PREFIX: &str = "!";

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: u16,
    pub max_volume: u16,

    // Búsqueda
    pub search_limit: usize,
    pub selection_ttl: Duration,

    // Permisos
    pub dj_role_id: Option<RoleId>,
}

impl Config {
    /// Carga la configuración desde el entorno (y `.env` si existe)
    pub fn load() -> MusicResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración con cualquier fuente de variables.
    ///
    /// Only a missing Discord token is fatal. Every other bad value is a
    /// configuration error that gets corrected to a safe value with a warning.
    pub fn from_lookup<F>(lookup: F) -> MusicResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MusicError::Configuration("falta DISCORD_TOKEN".into()))?;

        let command_prefix = match lookup("COMMAND_PREFIX").map(|p| p.trim().to_string()) {
            Some(prefix) if !prefix.is_empty() => prefix,
            Some(_) => {
                warn!("⚠️ COMMAND_PREFIX vacío, usando '{}'", DEFAULT_PREFIX);
                DEFAULT_PREFIX.to_string()
            }
            None => DEFAULT_PREFIX.to_string(),
        };

        let max_volume = match parse_var(&lookup, "MAX_VOLUME", i64::from(DEFAULT_MAX_VOLUME)) {
            v if v <= 0 => {
                warn!("⚠️ MAX_VOLUME={} no es válido, usando {}", v, DEFAULT_MAX_VOLUME);
                DEFAULT_MAX_VOLUME
            }
            v if v > i64::from(VOLUME_CEILING) => {
                warn!("⚠️ MAX_VOLUME={} excede el límite, usando {}", v, VOLUME_CEILING);
                VOLUME_CEILING
            }
            v => v as u16,
        };

        let requested = parse_var(&lookup, "DEFAULT_VOLUME", i64::from(DEFAULT_VOLUME));
        let default_volume = requested.clamp(0, i64::from(max_volume)) as u16;
        if i64::from(default_volume) != requested {
            warn!(
                "⚠️ DEFAULT_VOLUME={} fuera de [0, {}], usando {}",
                requested, max_volume, default_volume
            );
        }

        let requested = parse_var(&lookup, "SEARCH_LIMIT", DEFAULT_SEARCH_LIMIT as i64);
        let search_limit = requested.clamp(0, MAX_SEARCH_LIMIT as i64) as usize;
        if search_limit as i64 != requested {
            warn!(
                "⚠️ SEARCH_LIMIT={} fuera de [0, {}], usando {}",
                requested, MAX_SEARCH_LIMIT, search_limit
            );
        }

        let selection_ttl =
            match parse_var(&lookup, "SELECTION_TTL_SECS", DEFAULT_SELECTION_TTL.as_secs()) {
                0 => {
                    warn!(
                        "⚠️ SELECTION_TTL_SECS=0 no es válido, usando {}",
                        humantime::format_duration(DEFAULT_SELECTION_TTL)
                    );
                    DEFAULT_SELECTION_TTL
                }
                secs => Duration::from_secs(secs),
            };

        let dj_role_id = lookup("DJ_ROLE_ID").and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(id) if id > 0 => Some(RoleId::new(id)),
            _ => {
                warn!("⚠️ DJ_ROLE_ID='{}' no es un ID válido, se ignora", raw);
                None
            }
        });

        Ok(Self {
            discord_token,
            command_prefix,
            default_volume,
            max_volume,
            search_limit,
            selection_ttl,
            dj_role_id,
        })
    }

    /// Resumen sin datos sensibles, para el log de arranque
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: '{}'\n  \
            Audio: {}% vol (máx {}%)\n  \
            Search: {} resultados, expiran en {}\n  \
            DJ role: {}",
            self.command_prefix,
            self.default_volume,
            self.max_volume,
            self.search_limit,
            humantime::format_duration(self.selection_ttl),
            self.dj_role_id
                .map_or("ninguno".to_string(), |id| id.to_string()),
        )
    }
}

/// Lee una variable numérica; si no se puede leer, avisa y usa el valor por defecto
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("⚠️ {}='{}' inválido ({}), usando {}", key, raw, e, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> MusicResult<Config> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DISCORD_TOKEN", "token")]).unwrap();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.default_volume, 50);
        assert_eq!(config.max_volume, 150);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.selection_ttl, Duration::from_secs(120));
        assert!(config.dj_role_id.is_none());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        assert!(matches!(load(&[]), Err(MusicError::Configuration(_))));
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_out_of_range_values_are_corrected() {
        let config = load(&[
            ("DISCORD_TOKEN", "token"),
            ("MAX_VOLUME", "0"),
            ("DEFAULT_VOLUME", "400"),
            ("SEARCH_LIMIT", "25"),
            ("SELECTION_TTL_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.max_volume, DEFAULT_MAX_VOLUME);
        assert_eq!(config.default_volume, DEFAULT_MAX_VOLUME);
        assert_eq!(config.search_limit, MAX_SEARCH_LIMIT);
        assert_eq!(config.selection_ttl, DEFAULT_SELECTION_TTL);

        let config = load(&[
            ("DISCORD_TOKEN", "token"),
            ("MAX_VOLUME", "5000"),
            ("SEARCH_LIMIT", "-3"),
        ])
        .unwrap();
        assert_eq!(config.max_volume, VOLUME_CEILING);
        assert_eq!(config.search_limit, 0);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = load(&[
            ("DISCORD_TOKEN", "token"),
            ("DEFAULT_VOLUME", "loud"),
            ("DJ_ROLE_ID", "dj"),
        ])
        .unwrap();
        assert_eq!(config.default_volume, DEFAULT_VOLUME);
        assert!(config.dj_role_id.is_none());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = load(&[("DISCORD_TOKEN", "super-secret")]).unwrap();
        assert!(!config.summary().contains("super-secret"));
    }
}

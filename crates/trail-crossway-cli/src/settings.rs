use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use trail_crossway_lib::{Config, Coordinate2D, DetailLevel};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Trail Crossway - keep trails and the places they cross consistent
pub struct Settings {
    /// JSON store snapshot to operate on (an empty store when omitted)
    #[clap(short, long, value_name = "FILE", global = true)]
    pub store: Option<PathBuf>,

    /// Write the store back to the snapshot file after a successful command
    #[clap(long, default_value = "false", requires = "store", global = true)]
    pub save: bool,

    /// JSON engine configuration; individual flags below override it
    #[clap(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Tolerance in degrees under which segment endpoints count as touching
    #[clap(long, global = true)]
    pub epsilon: Option<f64>,

    /// Retries of a propagation write after a version conflict
    #[clap(long, global = true)]
    pub max_conflict_retries: Option<u32>,

    /// Page size used when walking store queries
    #[clap(long, global = true)]
    pub page_size: Option<usize>,

    /// Include the step journal of mutating commands in the output
    #[clap(long, default_value = "false", global = true)]
    pub journal: bool,

    /// Debug logging unless RUST_LOG says otherwise
    #[clap(short, long, default_value = "false", global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Trails crossed by a query line, with altitude-enriched crossing points
    Intersect {
        /// Query line as "lat,lon;lat,lon;..."
        #[clap(long, value_parser = parse_line, allow_hyphen_values = true)]
        line: Polyline,
        #[clap(long, default_value = "0")]
        skip: usize,
        #[clap(long, default_value = "100")]
        limit: usize,
        /// Altitude attached to every crossing point
        #[clap(long, default_value = "0.0")]
        altitude: f64,
    },
    /// Trails overlapping a rectangle
    Within {
        /// Opposite corners as "lat,lon;lat,lon"
        #[clap(long, value_parser = parse_line, allow_hyphen_values = true)]
        rect: Polyline,
        #[clap(long, default_value = "0")]
        skip: usize,
        #[clap(long, default_value = "100")]
        limit: usize,
        #[clap(long, value_enum, default_value = "full")]
        detail: Detail,
    },
    /// Attach a place to a trail and propagate crossway references
    Link {
        #[clap(long)]
        trail: String,
        #[clap(long)]
        place: String,
        /// Attachment point as "lat,lon"
        #[clap(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        at: Coordinate2D,
    },
    /// Detach a place from a trail
    Unlink {
        #[clap(long)]
        trail: String,
        #[clap(long)]
        place: String,
        /// Attachment point as "lat,lon"
        #[clap(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        at: Coordinate2D,
    },
    /// Delete a trail and clean up the places it crossed
    Delete {
        #[clap(long)]
        trail: String,
    },
    /// Insert or replace a trail read from a JSON file
    Save {
        #[clap(value_name = "FILE")]
        file: PathBuf,
    },
    /// Strip every trail's reference to a place
    RemovePlace {
        #[clap(long)]
        place: String,
    },
    /// Rebuild a place's edges from the trails holding it
    Reconcile {
        #[clap(long)]
        place: String,
    },
    /// Report every disagreement between trail and place records
    Check,
}

/// Coordinates given as one "lat,lon;lat,lon;..." argument
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline(pub Vec<Coordinate2D>);

/// Detail level accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Low,
    Medium,
    High,
    Full,
}

impl From<Detail> for DetailLevel {
    fn from(detail: Detail) -> Self {
        match detail {
            Detail::Low => DetailLevel::Low,
            Detail::Medium => DetailLevel::Medium,
            Detail::High => DetailLevel::High,
            Detail::Full => DetailLevel::Full,
        }
    }
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Engine configuration: defaults, then the config file, then individual flags
    pub fn engine_config(&self) -> anyhow::Result<Config> {
        use anyhow::Context;

        let mut config = match &self.config {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("Opening config {}", path.display()))?;
                serde_json::from_reader(std::io::BufReader::new(file))
                    .with_context(|| format!("Parsing config {}", path.display()))?
            }
            None => Config::default(),
        };
        if let Some(epsilon) = self.epsilon {
            config.intersection_epsilon = epsilon;
        }
        if let Some(retries) = self.max_conflict_retries {
            config.max_conflict_retries = retries;
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        Ok(config)
    }
}

/// Parse "lat,lon"
pub fn parse_coordinate(s: &str) -> Result<Coordinate2D, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lon\", got \"{s}\""))?;
    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("bad latitude \"{lat}\": {e}"))?;
    let longitude: f64 = lon
        .trim()
        .parse()
        .map_err(|e| format!("bad longitude \"{lon}\": {e}"))?;
    Coordinate2D::new(latitude, longitude)
        .validated()
        .map_err(|e| e.to_string())
}

/// Parse "lat,lon;lat,lon;..."
pub fn parse_line(s: &str) -> Result<Polyline, String> {
    s.split(';')
        .filter(|part| !part.trim().is_empty())
        .map(parse_coordinate)
        .collect::<Result<Vec<_>, _>>()
        .map(Polyline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(
            parse_coordinate("45.5, 7.25").unwrap(),
            Coordinate2D::new(45.5, 7.25)
        );
        assert!(parse_coordinate("45.5").is_err());
        assert!(parse_coordinate("abc,7").is_err());
        assert!(parse_coordinate("95,7").is_err());
    }

    #[test]
    fn test_parse_line() {
        let line = parse_line("0,0;1,1;").unwrap();
        assert_eq!(line.0.len(), 2);
        assert!(parse_line("0,0;x").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let settings = Settings::try_parse_from([
            "trail-crossway",
            "--epsilon",
            "0.001",
            "--max-conflict-retries",
            "7",
            "check",
        ])
        .unwrap();
        let config = settings.engine_config().unwrap();
        assert_eq!(config.intersection_epsilon, 0.001);
        assert_eq!(config.max_conflict_retries, 7);
        assert_eq!(config.page_size, Config::default().page_size);
    }

    #[test]
    fn test_southern_and_western_coordinates_parse() {
        let settings = Settings::try_parse_from([
            "trail-crossway",
            "link",
            "--trail",
            "t-1",
            "--place",
            "p-1",
            "--at",
            "-33.9,-18.4",
        ])
        .unwrap();
        let Command::Link { at, .. } = settings.command else {
            panic!("expected link, got {:?}", settings.command);
        };
        assert_eq!(at, Coordinate2D::new(-33.9, -18.4));

        let settings =
            Settings::try_parse_from(["trail-crossway", "intersect", "--line", "-1,2;1,-2"])
                .unwrap();
        let Command::Intersect { line, .. } = settings.command else {
            panic!("expected intersect, got {:?}", settings.command);
        };
        assert_eq!(line.0, vec![Coordinate2D::new(-1.0, 2.0), Coordinate2D::new(1.0, -2.0)]);

        let settings =
            Settings::try_parse_from(["trail-crossway", "within", "--rect", "-1,-1;1,1"]).unwrap();
        assert!(matches!(settings.command, Command::Within { .. }));
    }

    #[test]
    fn test_save_requires_store() {
        assert!(Settings::try_parse_from(["trail-crossway", "--save", "check"]).is_err());
    }
}

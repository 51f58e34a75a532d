use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    Cbs,
    Astar,
    Jps,
}

#[derive(Parser, Debug)]
#[command(
    name = "mapf_jps",
    about = "Multi-agent path finding with CBS over A* and Jump Point Search.",
    version = "0.1"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the map file")]
    pub map_path: Option<String>,

    #[arg(long, help = "Path to a YAML list of agents")]
    pub agents_path: Option<String>,

    #[arg(long, help = "Path to a MovingAI scenario file")]
    pub scen_path: Option<String>,

    #[arg(long, help = "Number of agents drawn from the scenario file")]
    pub num_agents: Option<usize>,

    #[arg(long, help = "Seed for the random number generator")]
    pub seed: Option<u64>,

    #[arg(long, value_enum, help = "Solver to use")]
    pub solver: Option<SolverKind>,

    #[arg(long, help = "Latest timestep a low-level search may reach")]
    pub max_time_step: Option<usize>,

    #[arg(long, help = "Block low-level successors that match a CBS constraint")]
    pub enforce_constraints: bool,

    #[arg(long, help = "Where to write the paths (.json or .yaml)")]
    pub output_path: Option<String>,

    #[arg(long, help = "Log every expansion")]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub map_path: String,
    pub agents_path: Option<String>,
    pub scen_path: Option<String>,
    pub num_agents: usize,
    pub seed: u64,
    pub solver: SolverKind,
    pub max_time_step: Option<usize>,
    pub enforce_constraints: bool,
    pub output_path: Option<String>,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            map_path: "map_file/test/room-5-5.map".to_string(),
            agents_path: Some("map_file/test/agents-room-5-5.yaml".to_string()),
            scen_path: None,
            num_agents: 2,
            seed: 0,
            solver: SolverKind::Cbs,
            max_time_step: None,
            enforce_constraints: false,
            output_path: None,
            debug: false,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Command-line values win over whatever the config file said.
    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(map_path) = &cli.map_path {
            self.map_path = map_path.clone();
        }
        if let Some(agents_path) = &cli.agents_path {
            self.agents_path = Some(agents_path.clone());
            self.scen_path = None;
        }
        if let Some(scen_path) = &cli.scen_path {
            self.scen_path = Some(scen_path.clone());
            self.agents_path = None;
        }
        if let Some(num_agents) = cli.num_agents {
            self.num_agents = num_agents;
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(solver) = cli.solver {
            self.solver = solver;
        }
        if cli.max_time_step.is_some() {
            self.max_time_step = cli.max_time_step;
        }
        if let Some(output_path) = &cli.output_path {
            self.output_path = Some(output_path.clone());
        }
        self.enforce_constraints |= cli.enforce_constraints;
        self.debug |= cli.debug;

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.map_path.is_empty() {
            return Err(anyhow!("A map path is required"));
        }
        match (&self.agents_path, &self.scen_path) {
            (None, None) => {
                return Err(anyhow!("Either an agents file or a scenario file is required"));
            }
            (Some(_), Some(_)) => {
                return Err(anyhow!(
                    "Agents file and scenario file are mutually exclusive"
                ));
            }
            _ => {}
        }
        if self.scen_path.is_some() && self.num_agents == 0 {
            return Err(anyhow!(
                "Number of agents must be positive when sampling a scenario"
            ));
        }
        if self.max_time_step == Some(0) {
            return Err(anyhow!("Max time step must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_yaml_fills_missing_fields_with_defaults() {
        let config = Config::from_yaml_str(
            "map_path: maps/empty-8-8.map\nsolver: jps\nmax_time_step: 40\n",
        )
        .unwrap();
        assert_eq!(config.map_path, "maps/empty-8-8.map");
        assert_eq!(config.solver, SolverKind::Jps);
        assert_eq!(config.max_time_step, Some(40));
        assert_eq!(config.num_agents, Config::default().num_agents);
        assert!(!config.enforce_constraints);

        assert!(Config::from_yaml_str("solver: dijkstra\n").is_err());
    }

    #[test]
    fn test_command_line_overrides_file() {
        let cli = Cli::parse_from([
            "mapf_jps",
            "--scen-path",
            "map_file/test/room-5-5.scen",
            "--num-agents",
            "3",
            "--solver",
            "astar",
            "--debug",
        ]);
        let config = Config::default().override_from_command_line(&cli).unwrap();
        assert_eq!(config.scen_path.as_deref(), Some("map_file/test/room-5-5.scen"));
        assert_eq!(config.agents_path, None);
        assert_eq!(config.num_agents, 3);
        assert_eq!(config.solver, SolverKind::Astar);
        assert!(config.debug);
        assert!(!config.enforce_constraints);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let no_agents = Config {
            agents_path: None,
            ..Config::default()
        };
        assert!(no_agents.validate().is_err());

        let zero_horizon = Config {
            max_time_step: Some(0),
            ..Config::default()
        };
        assert!(zero_horizon.validate().is_err());

        let cli = Cli::parse_from(["mapf_jps", "--scen-path", "a.scen", "--num-agents", "0"]);
        assert!(Config::default().override_from_command_line(&cli).is_err());
    }
}

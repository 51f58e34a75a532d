use mapf_jps::common::{Agent, Solution};
use mapf_jps::config::{Cli, Config, SolverKind};
use mapf_jps::map::ObstacleMap;
use mapf_jps::scenario::Scenario;
use mapf_jps::solver::{
    CbsConfig, EngineConfig, GraphSearchEngine, SearchSolution, SingleAgentConfig,
};

use anyhow::{anyhow, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = std::fs::read_to_string(config_file)
            .with_context(|| format!("cannot read config file: {config_file}"))?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        info!("No config file specified, using default config");
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let map = Arc::new(ObstacleMap::from_file(&config.map_path)?);
    let agents = load_agents(&config)?;
    for agent in &agents {
        if !agent.verify(&map) {
            return Err(anyhow!("agent {} starts or ends on a blocked cell", agent.id));
        }
    }

    // Single-agent solvers only plan for the first agent.
    let planned = match config.solver {
        SolverKind::Cbs => &agents[..],
        SolverKind::Astar | SolverKind::Jps => &agents[..agents.len().min(1)],
    };
    let Some(solution) = solve(&config, &map, planned.to_vec())? else {
        error!("{:?} solve fails", config.solver);
        return Ok(());
    };
    if !solution.verify(&map, planned) {
        return Err(anyhow!("solver returned an invalid solution"));
    }
    info!("solution cost {}", solution.cost);

    if let Some(output_path) = &config.output_path {
        Scenario::write_solution(output_path, &solution)?;
        info!("paths written to {output_path}");
    }
    Ok(())
}

fn load_agents(config: &Config) -> anyhow::Result<Vec<Agent>> {
    match (&config.agents_path, &config.scen_path) {
        (Some(path), _) => Scenario::load_agents_from_yaml(path),
        (None, Some(path)) => {
            let scenario = Scenario::load_from_scen(path)?;
            let mut rng = StdRng::seed_from_u64(config.seed);
            scenario.generate_agents_randomly(config.num_agents, &mut rng)
        }
        (None, None) => Err(anyhow!("no agents to plan for")),
    }
}

fn solve(
    config: &Config,
    map: &Arc<ObstacleMap>,
    agents: Vec<Agent>,
) -> anyhow::Result<Option<Solution>> {
    let first_id = agents.first().map(|a| a.id).unwrap_or_default();
    let engine_config = match config.solver {
        SolverKind::Cbs => {
            let mut cbs = CbsConfig::new(agents, Arc::clone(map));
            cbs.enforce_constraints = config.enforce_constraints;
            cbs.max_time_step = config.max_time_step;
            cbs.debug = config.debug;
            EngineConfig::Cbs(cbs)
        }
        SolverKind::Astar | SolverKind::Jps => {
            let agent = agents
                .first()
                .ok_or_else(|| anyhow!("single-agent search needs at least one agent"))?;
            let mut single = SingleAgentConfig::new(agent, Arc::clone(map));
            single.use_jps = config.solver == SolverKind::Jps;
            single.max_time_step = config.max_time_step;
            single.debug = config.debug;
            EngineConfig::SingleAgent(single)
        }
    };

    let mut engine = GraphSearchEngine::new(engine_config)?;
    let result = engine.plan();
    engine.performance().print();

    let solution = match result {
        Some(SearchSolution::ConstraintTree(node)) => {
            for (agent, performance) in node.performance() {
                info!("agent {agent}:");
                performance.print();
            }
            Solution {
                cost: node.cost().unwrap_or_default(),
                paths: node.into_solution(),
            }
        }
        Some(SearchSolution::Path(path)) => Solution {
            cost: engine.performance().solution_cost.unwrap_or_default(),
            paths: [(first_id, path)].into_iter().collect(),
        },
        None => return Ok(None),
    };
    Ok(Some(solution))
}

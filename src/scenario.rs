use anyhow::{anyhow, Context, Result};
use rand::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::info;

use crate::common::{Agent, Solution};

/// One line of a MovingAI scenario. Coordinates are `(x, y)` = (column, row).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub start: (i32, i32),
    pub goal: (i32, i32),
}

#[derive(Debug, Default)]
pub struct Scenario {
    pub map: String,
    pub map_width: usize,
    pub map_height: usize,
    pub buckets: BTreeMap<usize, Vec<Route>>,
}

impl Scenario {
    pub fn load_from_scen(path: &str) -> Result<Scenario> {
        let file = File::open(path).with_context(|| format!("cannot open scenario {path}"))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        // First line is "version x"
        lines
            .next()
            .ok_or_else(|| anyhow!("scenario {path} is empty"))??;

        let mut scenario = Scenario::default();
        for (idx, line) in lines.enumerate() {
            let line = line?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if parts.len() < 8 {
                return Err(anyhow!("scenario {path} line {}: too few fields", idx + 2));
            }
            let field = |i: usize| -> Result<i32> {
                parts[i]
                    .parse()
                    .with_context(|| format!("scenario {path} line {}: bad field {i}", idx + 2))
            };
            let count = |i: usize| -> Result<usize> {
                parts[i].parse().with_context(|| {
                    format!("scenario {path} line {}: field {i} must be a count", idx + 2)
                })
            };

            let bucket_index = count(0)?;
            let route = Route {
                start: (field(4)?, field(5)?),
                goal: (field(6)?, field(7)?),
            };

            if scenario.map.is_empty() {
                scenario.map = parts[1].to_string();
                scenario.map_width = count(2)?;
                scenario.map_height = count(3)?;
            }
            scenario.buckets.entry(bucket_index).or_default().push(route);
        }

        Ok(scenario)
    }

    /// Draws `num_agents` distinct routes from all buckets.
    pub fn generate_agents_randomly<R: Rng + ?Sized>(
        &self,
        num_agents: usize,
        rng: &mut R,
    ) -> Result<Vec<Agent>> {
        let mut available_routes: Vec<&Route> = self.buckets.values().flatten().collect();
        available_routes.sort();
        available_routes.dedup();

        if available_routes.len() < num_agents {
            return Err(anyhow!(
                "only {} unique routes available for {num_agents} agents",
                available_routes.len()
            ));
        }

        available_routes.shuffle(rng);
        let mut used_goals = HashSet::new();
        let mut agents = Vec::with_capacity(num_agents);
        for route in available_routes {
            if agents.len() == num_agents {
                break;
            }
            // CBS rejects agents that share a goal.
            if !used_goals.insert(route.goal) {
                continue;
            }
            agents.push(Agent {
                id: agents.len(),
                start: route.start,
                goal: route.goal,
            });
        }
        if agents.len() < num_agents {
            return Err(anyhow!(
                "only {} routes with distinct goals for {num_agents} agents",
                agents.len()
            ));
        }

        info!("Generate scen: {agents:?}");
        Ok(agents)
    }

    pub fn load_agents_from_yaml(path: &str) -> Result<Vec<Agent>> {
        let file = File::open(path).with_context(|| format!("cannot open agents {path}"))?;
        let reader = BufReader::new(file);
        let agents = serde_yaml::from_reader(reader)?;
        Ok(agents)
    }

    /// Writes JSON when `path` ends in `.json`, YAML otherwise.
    pub fn write_solution(path: &str, solution: &Solution) -> Result<()> {
        let file = File::create(path).with_context(|| format!("cannot create {path}"))?;
        let mut writer = io::BufWriter::new(file);
        let is_json = Path::new(path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::to_writer_pretty(&mut writer, solution)?;
        } else {
            writer.write_all(serde_yaml::to_string(solution)?.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AgentPath, Location};
    use rand::rngs::StdRng;

    #[test]
    fn test_read_scenario() {
        let scen = Scenario::load_from_scen("map_file/test/room-5-5.scen").unwrap();
        assert_eq!(scen.map, "room-5-5.map");
        assert_eq!((scen.map_width, scen.map_height), (5, 5));
        assert_eq!(scen.buckets.len(), 2);
        assert_eq!(
            scen.buckets[&0][0],
            Route {
                start: (0, 2),
                goal: (4, 2)
            }
        );
        assert!(Scenario::load_from_scen("map_file/test/missing.scen").is_err());
    }

    #[test]
    fn test_negative_scenario_fields_are_rejected() {
        let dir = std::env::temp_dir();
        let write = |name: &str, body: &str| {
            let file = dir.join(format!("mapf_jps_{name}_{}.scen", std::process::id()));
            std::fs::write(&file, format!("version 1\n{body}\n")).unwrap();
            file.to_string_lossy().into_owned()
        };
        let negative_bucket = write("bucket", "-1\troom-5-5.map\t5\t5\t0\t2\t4\t2\t4.0");
        let negative_width = write("width", "0\troom-5-5.map\t-5\t5\t0\t2\t4\t2\t4.0");
        let valid = write("valid", "3\troom-5-5.map\t5\t5\t0\t2\t4\t2\t4.0");

        let err = Scenario::load_from_scen(&negative_bucket).unwrap_err();
        assert!(format!("{err:#}").contains("field 0"));
        assert!(Scenario::load_from_scen(&negative_width).is_err());
        let scen = Scenario::load_from_scen(&valid).unwrap();
        assert_eq!(scen.buckets.keys().copied().collect::<Vec<_>>(), vec![3]);

        for file in [negative_bucket, negative_width, valid] {
            let _ = std::fs::remove_file(file);
        }
    }

    #[test]
    fn test_generate_agents_is_seeded() {
        let scen = Scenario::load_from_scen("map_file/test/room-5-5.scen").unwrap();
        let first = scen
            .generate_agents_randomly(3, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let second = scen
            .generate_agents_randomly(3, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|a| a.id).collect::<Vec<_>>(), vec![0, 1, 2]);

        let goals: HashSet<_> = first.iter().map(|a| a.goal).collect();
        assert_eq!(goals.len(), 3);

        assert!(scen
            .generate_agents_randomly(5, &mut StdRng::seed_from_u64(7))
            .is_err());
    }

    #[test]
    fn test_load_agents_from_yaml() {
        let agents = Scenario::load_agents_from_yaml("map_file/test/agents-room-5-5.yaml").unwrap();
        assert_eq!(
            agents,
            vec![
                Agent {
                    id: 0,
                    start: (0, 2),
                    goal: (4, 2)
                },
                Agent {
                    id: 1,
                    start: (4, 2),
                    goal: (0, 2)
                },
            ]
        );
    }

    #[test]
    fn test_write_solution_picks_format_from_extension() {
        let solution = Solution {
            cost: 1.0,
            paths: BTreeMap::from([(
                0,
                AgentPath::new(vec![Location::new(0, 0, 0), Location::new(1, 0, 1)]),
            )]),
        };
        let dir = std::env::temp_dir();
        let json = dir.join(format!("mapf_jps_solution_{}.json", std::process::id()));
        let yaml = dir.join(format!("mapf_jps_solution_{}.yaml", std::process::id()));
        let (json, yaml) = (json.to_string_lossy(), yaml.to_string_lossy());

        Scenario::write_solution(&json, &solution).unwrap();
        Scenario::write_solution(&yaml, &solution).unwrap();

        let from_json: Solution =
            serde_json::from_str(&std::fs::read_to_string(&*json).unwrap()).unwrap();
        let from_yaml: Solution =
            serde_yaml::from_str(&std::fs::read_to_string(&*yaml).unwrap()).unwrap();
        assert_eq!(from_json, solution);
        assert_eq!(from_yaml, solution);

        let _ = std::fs::remove_file(&*json);
        let _ = std::fs::remove_file(&*yaml);
    }
}

use std::path::PathBuf;
use std::sync::Once;

use route_protocol::{parse_command_line, Direction, Occupancy};
use route_sim::{load_engine_config_from_env, Command, Engine, EngineConfig};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_engine_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test engine config at {}",
            config_path.display()
        );

        std::env::set_var("ROUTE_SIM_CONFIG_PATH", &config_path);
    });
}

pub fn test_config() -> EngineConfig {
    ensure_test_config();
    let (config, path) = load_engine_config_from_env();
    assert!(path.is_some(), "fixture config should be used");
    config
}

#[allow(dead_code)]
pub fn test_engine() -> Engine {
    Engine::new(test_config())
}

/// Run text commands the way a host's command channel would.
#[allow(dead_code)]
pub fn run_lines(engine: &mut Engine, lines: &[&str]) -> anyhow::Result<()> {
    for line in lines {
        let payload = parse_command_line(line)?;
        engine.dispatch(Command::from(payload))?;
    }
    Ok(())
}

#[allow(dead_code)]
pub fn cell(engine: &Engine, x: i32, y: i32) -> (Occupancy, Direction) {
    engine.board().get(x, y).expect("cell on board")
}

//! Line-driven console for poking at a local OBS instance.
//!
//! ```text
//! cargo run --example obs_console -- addr=localhost port=4455 pwd=secret debug=1
//! > preview Intro
//! > transition Gameplay Fade 300
//! > volume Mic 50 unmute
//! > quit
//! ```

use obs_local_controller::{ControllerConfig, ObsController, SceneTransition, VolumeTarget};
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_help() {
    println!("commands:");
    println!("  preview <scene>");
    println!("  transition <scene> [effect] [duration ms]");
    println!("  volume <input> <percent> [mute|unmute]");
    println!("  status");
    println!("  quit");
}

/// Parse one command line and hand it to the controller
fn dispatch(controller: &ObsController, line: &str) -> Result<bool, String> {
    let words: Vec<&str> = line.split_whitespace().collect();

    match words.as_slice() {
        [] => {}
        ["quit"] | ["exit"] => return Ok(false),
        ["help"] => print_help(),
        ["status"] => {
            println!(
                "connected: {}, preview pending: {}, transition pending: {}, volumes pending: {}",
                controller.is_connected(),
                controller.preview_scene().is_pending(),
                controller.transition().is_pending(),
                controller.volumes().is_pending(),
            );
        }
        ["preview", scene] => {
            controller.set_preview_scene(*scene);
        }
        ["transition", scene, rest @ ..] => {
            let duration_ms = match rest.get(1) {
                Some(ms) => Some(ms.parse::<u32>().map_err(|e| format!("bad duration: {}", e))?),
                None => None,
            };
            controller.set_transition(SceneTransition {
                scene: scene.to_string(),
                effect: rest.first().map(|effect| effect.to_string()),
                duration_ms,
            });
        }
        ["volume", input, percent, rest @ ..] => {
            let percent: f64 = percent
                .parse()
                .map_err(|e| format!("bad percentage: {}", e))?;
            let mut target = VolumeTarget::new(*input, percent / 100.0);
            match rest.first() {
                Some(&"mute") => target = target.with_mute(true),
                Some(&"unmute") => target = target.with_mute(false),
                Some(other) => return Err(format!("expected mute or unmute, got {}", other)),
                None => {}
            }
            controller.set_volumes(vec![target]);
        }
        _ => return Err(format!("unknown command: {}", line.trim())),
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ControllerConfig::from_params(
        args.iter()
            .filter_map(|arg| arg.split_once('=')),
    );
    println!("connecting to {}", config.session.url());

    let mut controller = ObsController::new(config);
    let mut outcomes = controller.subscribe_outcomes();
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match dispatch(&controller, &line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("{}", e),
                }
            }
            event = outcomes.recv() => {
                let event = event?;
                match event.result {
                    Ok(completion) => println!("{} done: {:?}", event.intent, completion),
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

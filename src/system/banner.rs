use std::io::IsTerminal;

use crossterm::style::{Color, Stylize};

use crate::orchestrator::RunConfig;

const TITLE_RGB: (u8, u8, u8) = (0xff, 0x5f, 0xc8);

/// Plan lines printed under the title before a run starts.
pub(crate) fn plan_lines(config: &RunConfig) -> Vec<String> {
    let plan = config.plan;
    let mut lines = Vec::new();
    lines.push(format!("- Run {} workers.", config.workers));
    if plan.batches() > 1 {
        lines.push(format!(
            "- Create {} connections at a time over {} seconds.",
            plan.batch_size(),
            config.interval_secs
        ));
    } else {
        lines.push("- Create all the connections at once.".to_owned());
    }
    lines.push(format!(
        "- Socket To {} websockets on {} connection(s) for {} seconds.",
        plan.amount(),
        config.urls.len(),
        config.duration.as_secs()
    ));
    lines
}

pub(crate) fn print_banner(config: &RunConfig, no_color: bool) {
    let use_color = !no_color && std::io::stdout().is_terminal();
    let title = format!("Socket To Me! v{}", env!("CARGO_PKG_VERSION"));
    if use_color {
        println!(
            "{}",
            title.with(Color::Rgb {
                r: TITLE_RGB.0,
                g: TITLE_RGB.1,
                b: TITLE_RGB.2
            })
        );
    } else {
        println!("{title}");
    }
    for line in plan_lines(config) {
        println!("{line}");
    }
    println!();
}

use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::{env, fs};

static CONFIGS: &[(&str, usize)] = &[
    ("ATT_MTU", 23),
    ("RESPONSE_POOL_SIZE", 2),
    ("NOTIFY_INTERVAL_MS", 2000),
];

fn main() {
    let crate_name = env::var("CARGO_PKG_NAME")
        .unwrap()
        .to_ascii_uppercase()
        .replace('-', "_");

    // only rebuild if build.rs changed. Otherwise Cargo will rebuild if any
    // other file changed.
    println!("cargo:rerun-if-changed=build.rs");

    // Rebuild if config envvar changed.
    for (name, _) in CONFIGS {
        println!("cargo:rerun-if-env-changed={crate_name}_{name}");
    }

    let mut configs: HashMap<&str, usize> = CONFIGS.iter().copied().collect();

    let prefix = format!("{crate_name}_");
    for (var, value) in env::vars() {
        if let Some(name) = var.strip_prefix(&prefix) {
            let Some(cfg) = configs.get_mut(name) else {
                panic!("Unknown env var {}", var)
            };

            let Ok(value) = value.parse::<usize>() else {
                panic!("env var {} must be an integer", var)
            };

            *cfg = value;
        }
    }

    let att_mtu = configs["ATT_MTU"];
    if !(23..=517).contains(&att_mtu) {
        panic!("{crate_name}_ATT_MTU must be between 23 and 517, got {att_mtu}");
    }
    if configs["RESPONSE_POOL_SIZE"] == 0 {
        panic!("{crate_name}_RESPONSE_POOL_SIZE must be at least 1");
    }
    if configs["NOTIFY_INTERVAL_MS"] == 0 {
        panic!("{crate_name}_NOTIFY_INTERVAL_MS must be at least 1");
    }

    let mut data = String::new();

    let mut names: Vec<_> = configs.keys().copied().collect();
    names.sort();
    for name in names {
        writeln!(&mut data, "pub const {}: usize = {};", name, configs[name]).unwrap();
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let out_file = out_dir.join("config.rs").to_string_lossy().to_string();
    fs::write(out_file, data).unwrap();
}

use clap::Parser as ClapParser;
use std::process;

use garnet::{CallSite, CallType, DispatchConfig, DispatchHead, NodeKind};
use object::{Arity, ObjectModel, Runtime, RuntimeConfig, RuntimeError, Value};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Distinct receiver classes the call site sees
    #[arg(long, default_value_t = 4, help = "Number of receiver classes")]
    receivers: usize,

    /// Cached nodes before the dispatch chain goes megamorphic
    #[arg(long, default_value_t = 8, help = "Dispatch chain cache depth")]
    depth: usize,

    /// Refills before an interpreter call site stops caching
    #[arg(long, default_value_t = 50, help = "Call site miss limit")]
    miss_limit: u32,

    /// Calls made through each cache
    #[arg(long, default_value_t = 1000, help = "Number of calls to make")]
    calls: usize,

    /// Redefine the method halfway through the run
    #[arg(long, help = "Redefine the target method mid-run")]
    redefine: bool,

    /// Warn about uninitialised instance variable reads
    #[arg(long, help = "Run the reference runtime in verbose mode")]
    verbose: bool,
}

fn drive(cli: &Cli) -> Result<(), RuntimeError> {
    let rt = Runtime::new(RuntimeConfig {
        verbose: cli.verbose,
    });
    let config = DispatchConfig::default()
        .with_cache_depth(cli.depth)
        .with_miss_limit(cli.miss_limit);

    let classes: Vec<_> = (0..cli.receivers.max(1))
        .map(|i| {
            let class = rt.define_class(&format!("Receiver{i}"), None);
            let tag = i as i64;
            rt.define_method(&class, "tag", Arity::fixed(0), move |_, _, _| {
                Ok(Value::Fixnum(tag))
            });
            class
        })
        .collect();
    let objects: Vec<_> = classes.iter().map(|class| rt.allocate(class)).collect();
    let name = rt.intern("tag");

    let head = DispatchHead::new(config);
    let site = CallSite::new(name, CallType::Normal, config.call_site_miss_limit);
    let mut sum = 0;
    for i in 0..cli.calls {
        if cli.redefine && i == cli.calls / 2 {
            log::info!("redefining {}#tag", classes[0].name());
            rt.define_method(&classes[0], "tag", Arity::fixed(0), |_, _, _| {
                Ok(Value::Fixnum(100))
            });
        }
        let receiver = &objects[i % objects.len()];
        let from_head = head.call(&rt, &Value::Nil, receiver, name, &[])?;
        let from_site = site.call(&rt, &Value::Nil, receiver, &[])?;
        if !from_head.identical(&from_site) {
            log::error!(
                "caches disagree: {} vs {}",
                from_head.inspect(rt.symbols()),
                from_site.inspect(rt.symbols())
            );
        }
        sum += from_head.as_fixnum().unwrap_or(0);
    }

    let chain = head.nodes();
    println!("dispatch chain ({} nodes):", chain.len());
    for info in &chain {
        match info.policy {
            Some(policy) if policy.force_inline || policy.clone_target => {
                println!("  {:?} {:?}", info.kind, policy)
            }
            _ => println!("  {:?}", info.kind),
        }
    }
    let stats = head.stats();
    println!(
        "dispatch: hits={} rewrites={} resets={} uncached={} megamorphic={}",
        stats.hits,
        stats.rewrites,
        stats.resets,
        stats.uncached,
        chain.first().map(|info| info.kind) == Some(NodeKind::Uncached)
    );
    let site_stats = site.stats();
    println!(
        "call site: hits={} misses={} megamorphic={}",
        site_stats.hits,
        site_stats.misses,
        site.is_megamorphic()
    );
    println!("polls={} sum={sum}", rt.poll_count());
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = drive(&cli) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

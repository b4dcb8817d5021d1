use clap::Parser;

/// Default MTU when no MTU operand is given.
pub const DEFAULT_MTU: u32 = 1420;

#[derive(Parser, Debug)]
#[command(
    name = "tunup",
    about = "Bring up and supervise a tunnel interface",
    version
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// [NAME [MTU CONFIG [IPV4 IPV6 ENDPOINT]]]
    pub operands: Vec<String>,
}

/// The six-operand static address/route form, still unparsed.
#[derive(Debug, Clone)]
pub struct StaticNetArgs {
    pub ipv4: String,
    pub ipv6: String,
    pub endpoint: String,
}

/// Operands for a run, raw where validation belongs to the orchestrator.
///
/// The MTU stays a string on purpose: the orchestrator parses it so a bad
/// value is logged under the requested interface name before anything is
/// created.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub name: Option<String>,
    pub mtu: Option<String>,
    pub config: Option<String>,
    pub net: Option<StaticNetArgs>,
}

#[derive(Debug, Clone)]
pub enum Invocation {
    /// Wrong operand arity: show usage, exit zero, touch nothing
    Usage,
    Run(RunArgs),
}

/// Map the operand arity onto a run mode. Only 0, 1, 3 and 6 operands mean
/// anything; every other count is a usage request.
pub fn parse_invocation(operands: &[String]) -> Invocation {
    match operands {
        [] => Invocation::Run(RunArgs::default()),
        [name] => Invocation::Run(RunArgs {
            name: Some(name.clone()),
            ..RunArgs::default()
        }),
        [name, mtu, config] => Invocation::Run(RunArgs {
            name: Some(name.clone()),
            mtu: Some(mtu.clone()),
            config: Some(config.clone()),
            net: None,
        }),
        [name, mtu, config, ipv4, ipv6, endpoint] => Invocation::Run(RunArgs {
            name: Some(name.clone()),
            mtu: Some(mtu.clone()),
            config: Some(config.clone()),
            net: Some(StaticNetArgs {
                ipv4: ipv4.clone(),
                ipv6: ipv6.clone(),
                endpoint: endpoint.clone(),
            }),
        }),
        _ => Invocation::Usage,
    }
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {} [<interface name> [<mtu> <config> [<ipv4> <ipv6> <endpoint>]]]",
        prog
    )
}

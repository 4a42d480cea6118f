use clap::Parser;
use racetune::driver::Logs;
use racetune::driver::Rtac;
use racetune::driver::resolve_wrapper_name;
use racetune::scenario::Scenario;

fn main() -> anyhow::Result<()> {
    let mut scenario = Scenario::parse().validated()?;
    resolve_wrapper_name(&mut scenario);
    let logs = Logs::new(
        &scenario.log_dir(),
        scenario.objective_min,
        scenario.resume,
        scenario.experimental,
    )?;
    racetune::init(&scenario.log_dir(), scenario.verbosity);
    let mut rtac = Rtac::new(scenario, logs)?;
    rtac.run()
}

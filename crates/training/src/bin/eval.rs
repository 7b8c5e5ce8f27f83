use clap::Parser;
use training::eval::{run_eval, EvalArgs};

fn main() -> anyhow::Result<()> {
    training::init_tracing();
    run_eval(EvalArgs::parse())
}

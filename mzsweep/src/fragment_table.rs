use std::env;
use std::process::ExitCode;

use mzsweep::fragments::{default_ion_specs, fragments, ChargeState, FragmentError, IonSpec};

fn run() -> Result<(), FragmentError> {
    let mut args = env::args().skip(1);
    let sequence = args
        .next()
        .inspect(|s| eprintln!("sequence: {s}"))
        .ok_or(FragmentError::EmptySequence)?;
    let charge: i32 = match args.next() {
        Some(z) => z.parse::<ChargeState>()?.into(),
        None => 1,
    };
    eprintln!("z: {charge}");
    let specs: Vec<IonSpec> = args.map(|s| s.parse()).collect::<Result<_, _>>()?;
    let specs = if specs.is_empty() {
        default_ion_specs()
    } else {
        specs
    };

    println!("label\tsubsequence\tm/z\tcharge");
    for ion in fragments(&sequence, &specs, charge)? {
        println!(
            "{}\t{}\t{:.5}\t{}",
            ion.label, ion.subsequence, ion.mz, ion.charge
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

use anyhow::Result;

use crate::{
    cache::CacheHierarchy,
    cpu::{ControlFlow, Cpu, ExecutionTrace},
    io::Sink,
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// drives the machine one instruction at a time until it halts. each step
/// runs to completion before the next begins; there is exactly one memory
/// operation in flight at any moment.
pub struct Simulator<S> {
    cpu: Cpu<S>,
    cycle: usize,
    #[cfg(feature = "stat")]
    stat_builder: stat::SimStatBuilder,
}

impl<S: Sink> Simulator<S> {
    pub fn new(image: &[u16], cache: CacheHierarchy, sink: S) -> Self {
        Self {
            cpu: Cpu::new(image, cache, sink),
            cycle: 0,
            #[cfg(feature = "stat")]
            stat_builder: stat::SimStatBuilder::new(),
        }
    }

    pub fn run(&mut self, do_trace: bool) -> Result<()> {
        loop {
            let r = self.cpu.step(do_trace)?;
            self.cycle += 1;
            if let Some(ExecutionTrace {
                pc,
                undecoded_instr,
                decoded_instr,
            }) = &r.trace
            {
                log::debug!(
                    "#{cycle:010}, pc: {pc:5},\tinstr: {undecoded_instr:#018b}\t{decoded_instr}",
                    cycle = self.cycle
                );
            }
            if let ControlFlow::Halt = r.flow {
                break;
            }
        }
        #[cfg(feature = "stat")]
        {
            self.stat_builder.cycle(self.cycle);
            self.stat_builder.stop_timer();
        }
        Ok(())
    }
}

impl<S> Simulator<S> {
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub fn cpu(&self) -> &Cpu<S> {
        &self.cpu
    }

    pub fn into_cpu(self) -> Cpu<S> {
        self.cpu
    }

    #[cfg(feature = "stat")]
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

#[cfg(feature = "stat")]
impl<S> AddStats for Simulator<S> {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.stat_builder.finish()));
        self.cpu.add_stats(buf);
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::{fmt, time};

    use crate::stat::*;

    pub struct SimStatBuilder {
        begin: time::Instant,
        cycle: Option<usize>,
        elapsed: Option<time::Duration>,
    }

    impl SimStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: time::Instant::now(),
                cycle: None,
                elapsed: None,
            }
        }
        pub fn cycle(&mut self, cycle: usize) {
            self.cycle = Some(cycle)
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = Some(time::Instant::now() - self.begin)
        }
        pub fn finish(&self) -> SimStat {
            SimStat {
                cycle: self.cycle.unwrap_or(0),
                elapsed: self.elapsed.unwrap_or_default(),
            }
        }
    }

    impl Default for SimStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct SimStat {
        cycle: usize,
        elapsed: time::Duration,
    }

    impl Stat for SimStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ SimStat {
        fn header(&self) -> &'static str {
            "simulator stat"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for &'_ SimStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let ms = format!("{} ms", self.elapsed.as_millis());
            writeln!(f, "  elapsed total: {ms:>9}")?;
            let cycle = format!("#{}", self.cycle);
            writeln!(f, "  instrs total: {cycle:>10}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::Status, io::BufferSink, register::RegId};

    // addi $1, $0, 42 / sw $1, 32($0) / lw $2, 32($0) / j 3
    const PROGRAM: [u16; 4] = [
        0b001_000_001_0101010,
        0b101_000_001_0100000,
        0b100_000_010_0100000,
        0b010_0000000000011,
    ];

    #[test]
    fn test_run_to_halt() {
        let cache = CacheHierarchy::from_spec(&[16, 2, 4]).unwrap();
        let mut sim = Simulator::new(&PROGRAM, cache, BufferSink::new());
        sim.run(false).unwrap();
        assert_eq!(4, sim.cycle());
        assert_eq!(42, sim.cpu().get_reg(RegId::from(2)));
        let records = sim.into_cpu().into_sink().into_inner();
        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(vec![Status::Sw, Status::Miss], statuses);
    }

    #[test]
    fn test_run_without_cache_logs_nothing() {
        let mut sim = Simulator::new(&PROGRAM, CacheHierarchy::disabled(), BufferSink::new());
        sim.run(false).unwrap();
        assert!(sim.into_cpu().into_sink().records().is_empty());
    }
}

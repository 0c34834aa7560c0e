use std::fmt;

use anyhow::Result;

use crate::{
    cache::{AccessKind, CacheHierarchy},
    common::Pc,
    instr::{Instr, JInstr, RInstr, RiInstr},
    io::Sink,
    memory::{Memory, MEM_SIZE},
    reg_file::RegFile,
    register::RegId,
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// the E20 machine: registers, memory, program counter and the data-cache
/// hierarchy. the cache sees only `(pc, addr, kind)`; every record it
/// produces goes straight to the sink.
pub struct Cpu<S> {
    reg_file: RegFile,
    memory: Memory,
    cache: CacheHierarchy,
    pc: Pc,
    sink: S,
    #[cfg(feature = "stat")]
    i_stat: stat::InstrStat,
    #[cfg(feature = "stat")]
    c_stat: stat::CacheStat,
}

pub struct ExecutionTrace {
    pub pc: Pc,
    pub undecoded_instr: u16,
    pub decoded_instr: Instr,
}

#[derive(Default)]
pub struct CycleResult {
    pub trace: Option<ExecutionTrace>,
    pub flow: ControlFlow,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    #[default]
    Continue,
    Halt,
}

impl<S: Sink> Cpu<S> {
    pub fn new(image: &[u16], cache: CacheHierarchy, sink: S) -> Self {
        let mut memory = Memory::new();
        memory.init_from_image(image);
        Self {
            #[cfg(feature = "stat")]
            c_stat: stat::CacheStat::new(&cache),
            reg_file: RegFile::new(),
            memory,
            cache,
            pc: Pc::new(0),
            sink,
            #[cfg(feature = "stat")]
            i_stat: Default::default(),
        }
    }

    fn mem_access(&mut self, pc: Pc, addr: u16, kind: AccessKind) -> Result<()> {
        for rec in self.cache.access(pc, addr, kind) {
            #[cfg(feature = "stat")]
            self.c_stat.encounter(&rec);
            self.sink.record(&rec)?;
        }
        Ok(())
    }

    /// fetch, decode and execute one instruction.
    pub fn step(&mut self, do_trace: bool) -> Result<CycleResult> {
        let mut res = CycleResult::default();
        let old_pc = self.pc;
        let bin = self.memory.get(old_pc.inner());
        let instr = Instr::decode_from(bin)?;
        if do_trace {
            res.trace = Some(ExecutionTrace {
                pc: old_pc,
                undecoded_instr: bin,
                decoded_instr: instr,
            });
        }
        #[cfg(feature = "stat")]
        self.i_stat.encounter_instr(&instr);

        // jump targets are compared raw against the pc; only an exact match
        // halts, everything else lands reduced into memory range
        let mut jump: Option<u32> = None;
        match instr {
            Instr::R {
                instr,
                rs1,
                rs2,
                rd,
            } => {
                let a = self.reg_file.get(rs1);
                let b = self.reg_file.get(rs2);
                match instr {
                    RInstr::Add => self.reg_file.set(rd, a.wrapping_add(b)),
                    RInstr::Sub => self.reg_file.set(rd, a.wrapping_sub(b)),
                    RInstr::And => self.reg_file.set(rd, a & b),
                    RInstr::Or => self.reg_file.set(rd, a | b),
                    RInstr::Slt => self.reg_file.set(rd, u16::from(a < b)),
                    RInstr::Jr => jump = Some(u32::from(a)),
                }
            }
            Instr::Ri { instr, ra, rb, imm } => match instr {
                RiInstr::Addi => {
                    let val = self.reg_file.get(ra).wrapping_add(imm);
                    self.reg_file.set(rb, val);
                }
                RiInstr::Slti => {
                    let val = u16::from(self.reg_file.get(ra) < imm);
                    self.reg_file.set(rb, val);
                }
                RiInstr::Lw => {
                    let addr = self.reg_file.get(ra).wrapping_add(imm) % MEM_SIZE as u16;
                    self.mem_access(old_pc, addr, AccessKind::Read)?;
                    let val = self.memory.get(addr);
                    self.reg_file.set(rb, val);
                }
                RiInstr::Sw => {
                    let addr = self.reg_file.get(ra).wrapping_add(imm) % MEM_SIZE as u16;
                    self.mem_access(old_pc, addr, AccessKind::Write)?;
                    self.memory.set(addr, self.reg_file.get(rb));
                }
                RiInstr::Jeq => {
                    if self.reg_file.get(ra) == self.reg_file.get(rb) {
                        jump = Some(u32::from(old_pc.inner()) + 1 + u32::from(imm));
                    }
                }
            },
            Instr::J { instr, imm } => {
                if let JInstr::Jal = instr {
                    self.reg_file.set(RegId::LINK, old_pc.inner() + 1);
                }
                jump = Some(u32::from(imm));
            }
        }

        match jump {
            Some(target) if target == u32::from(old_pc.inner()) => {
                res.flow = ControlFlow::Halt;
            }
            Some(target) => self.pc = Pc::new((target % MEM_SIZE as u32) as u16),
            None => self.pc.advance(),
        }
        Ok(res)
    }
}

impl<S> Cpu<S> {
    pub fn get_pc(&self) -> Pc {
        self.pc
    }

    pub fn get_reg(&self, id: RegId) -> u16 {
        self.reg_file.get(id)
    }

    pub fn get_mem(&self, addr: u16) -> u16 {
        self.memory.get(addr)
    }

    pub fn cache_levels(&self) -> &[crate::cache::CacheLevel] {
        self.cache.levels()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn state_view(&self, memquantity: usize) -> StateView<'_> {
        StateView {
            pc: self.pc,
            reg_file: &self.reg_file,
            memory: &self.memory,
            memquantity,
        }
    }
}

#[cfg(feature = "stat")]
impl<S> AddStats for Cpu<S> {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.i_stat.clone()));
        buf.push(Box::new(self.c_stat.clone()));
    }
}

/// renders the architectural state the way the reference dump prints it:
/// pc, every register, then the first cells of memory as hex words.
pub struct StateView<'a> {
    pc: Pc,
    reg_file: &'a RegFile,
    memory: &'a Memory,
    memquantity: usize,
}

impl fmt::Display for StateView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Final state:")?;
        writeln!(f, "\tpc={:5}", self.pc)?;
        for (reg, regval) in self.reg_file.values().iter().enumerate() {
            writeln!(f, "\t${reg}={regval:5}")?;
        }
        let shown = self.memquantity.min(self.memory.cells().len());
        for chunk in self.memory.cells()[..shown].chunks(8) {
            for val in chunk {
                write!(f, "{val:04x} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::fmt;

    use crate::{
        cache::{AccessRecord, CacheHierarchy, Status},
        instr::{Instr, Mnemonic},
        stat::*,
    };

    #[derive(Clone)]
    pub struct InstrStat {
        /// indexed by Mnemonic
        instr_executed: [usize; Mnemonic::ALL.len()],
    }

    impl InstrStat {
        pub fn encounter_instr(&mut self, i: &Instr) {
            self.instr_executed[i.mnemonic() as usize] += 1;
        }
    }

    impl Default for InstrStat {
        fn default() -> Self {
            Self {
                instr_executed: [0; Mnemonic::ALL.len()],
            }
        }
    }

    impl Stat for InstrStat {
        fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
            Box::new(InstrStatView {
                stat: self,
                chunk_size: InstrStatView::chunk_size(max_width),
            })
        }
    }

    pub struct InstrStatView<'a> {
        stat: &'a InstrStat,
        chunk_size: usize,
    }

    impl StatView for InstrStatView<'_> {
        fn header(&self) -> &'static str {
            "executed instructions"
        }
        fn width(&self) -> usize {
            Self::width_by_chunk_size(self.chunk_size)
        }
    }

    impl Width for InstrStatView<'_> {
        fn width_by_chunk_size(chunk_size: usize) -> usize {
            chunk_size * 18 + (chunk_size - 1) * 2 + 2
        }
    }

    impl fmt::Display for InstrStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let map: Vec<_> = Mnemonic::ALL
                .iter()
                .zip(self.stat.instr_executed)
                .map(|(m, count)| format!("{m:>5}: {count:>11}"))
                .collect();
            for chunk in map.chunks(self.chunk_size) {
                let s = chunk.join(", ");
                writeln!(f, "  {s}")?;
            }
            Ok(())
        }
    }

    #[derive(Clone)]
    pub struct CacheStat {
        levels: Vec<LevelStat>,
    }

    #[derive(Clone)]
    struct LevelStat {
        name: String,
        hits: usize,
        misses: usize,
        stores: usize,
    }

    impl CacheStat {
        pub fn new(cache: &CacheHierarchy) -> Self {
            Self {
                levels: cache
                    .levels()
                    .iter()
                    .map(|l| LevelStat {
                        name: l.geometry().name().to_string(),
                        hits: 0,
                        misses: 0,
                        stores: 0,
                    })
                    .collect(),
            }
        }
        pub fn encounter(&mut self, rec: &AccessRecord) {
            if let Some(l) = self.levels.iter_mut().find(|l| l.name == rec.level) {
                match rec.status {
                    Status::Hit => l.hits += 1,
                    Status::Miss => l.misses += 1,
                    Status::Sw => l.stores += 1,
                }
            }
        }
    }

    impl Stat for CacheStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(CacheStatView { stat: self })
        }
    }

    pub struct CacheStatView<'a> {
        stat: &'a CacheStat,
    }

    impl StatView for CacheStatView<'_> {
        fn header(&self) -> &'static str {
            "cache events"
        }
        fn width(&self) -> usize {
            64
        }
    }

    impl fmt::Display for CacheStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.stat.levels.is_empty() {
                return writeln!(f, "  (caching disabled)");
            }
            for l in &self.stat.levels {
                let reads = l.hits + l.misses;
                let pct = if reads == 0 {
                    0.
                } else {
                    100. * l.hits as f64 / reads as f64
                };
                let pct = format!("{pct:.6}");
                writeln!(
                    f,
                    "  {name} hit: {hits:>9} ({pct:>8}%)  miss: {misses:>9}  sw: {stores:>9}",
                    name = l.name,
                    hits = l.hits,
                    misses = l.misses,
                    stores = l.stores
                )?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::Status,
        io::{BufferSink, EmptySink},
    };

    fn run<S: Sink>(cpu: &mut Cpu<S>) {
        for _ in 0..10_000 {
            if let ControlFlow::Halt = cpu.step(false).unwrap().flow {
                return;
            }
        }
        panic!("program did not halt");
    }

    #[test]
    fn test_halt_on_jump_to_self() {
        // j 0
        let mut cpu = Cpu::new(&[0b010_0000000000000], CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        assert_eq!(0, cpu.get_pc().inner());
    }

    #[test]
    fn test_arithmetic_program() {
        let image = [
            0b001_000_001_0000101, // addi $1, $0, 5
            0b001_000_010_0000111, // addi $2, $0, 7
            0b000_001_010_011_0000, // add $3, $1, $2
            0b000_001_010_100_0001, // sub $4, $1, $2
            0b010_0000000000100,   // j 4 (halt)
        ];
        let mut cpu = Cpu::new(&image, CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        assert_eq!(12, cpu.get_reg(RegId::from(3)));
        assert_eq!(-2i16 as u16, cpu.get_reg(RegId::from(4)));
        assert_eq!(4, cpu.get_pc().inner());
    }

    #[test]
    fn test_zero_register_write_is_discarded() {
        let image = [
            0b001_000_000_0000101, // addi $0, $0, 5
            0b010_0000000000001,   // j 1 (halt)
        ];
        let mut cpu = Cpu::new(&image, CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        assert_eq!(0, cpu.get_reg(RegId::from(0)));
    }

    #[test]
    fn test_jal_links_and_jr_returns() {
        let image = [
            0b011_0000000000011, // jal 3
            0b010_0000000000001, // j 1 (halt)
            0,
            0b000_111_000_000_1000, // jr $7
        ];
        let mut cpu = Cpu::new(&image, CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        assert_eq!(1, cpu.get_reg(RegId::LINK));
        assert_eq!(1, cpu.get_pc().inner());
    }

    #[test]
    fn test_jeq_taken_and_not_taken() {
        let image = [
            0b001_000_001_0000011, // addi $1, $0, 3
            0b110_001_010_0000010, // jeq $1, $2, 2 -> not taken ($2 = 0)
            0b001_000_010_0000011, // addi $2, $0, 3
            0b110_001_010_0000001, // jeq $1, $2, 1 -> taken, skips next
            0b001_000_011_0000001, // addi $3, $0, 1 (skipped)
            0b010_0000000000101,   // j 5 (halt)
        ];
        let mut cpu = Cpu::new(&image, CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        assert_eq!(0, cpu.get_reg(RegId::from(3)));
        assert_eq!(5, cpu.get_pc().inner());
    }

    #[test]
    fn test_slt_and_slti_compare_unsigned() {
        let image = [
            0b001_000_001_1111111, // addi $1, $0, -1 (0xffff)
            0b111_001_010_0000001, // slti $2, $1, 1 -> 0, 0xffff is large unsigned
            0b001_000_011_0000001, // addi $3, $0, 1
            0b000_011_001_100_0100, // slt $4, $3, $1 -> 1
            0b010_0000000000100,   // j 4 (halt)
        ];
        let mut cpu = Cpu::new(&image, CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        assert_eq!(0xffff, cpu.get_reg(RegId::from(1)));
        assert_eq!(0, cpu.get_reg(RegId::from(2)));
        assert_eq!(1, cpu.get_reg(RegId::from(4)));
    }

    #[test]
    fn test_loads_and_stores_drive_the_cache() {
        let image = [
            0b001_000_001_0101010, // addi $1, $0, 42
            0b101_000_001_0111100, // sw $1, 60($0)
            0b100_000_010_0111100, // lw $2, 60($0)
            0b100_000_011_0111100, // lw $3, 60($0)
            0b010_0000000000100,   // j 4 (halt)
        ];
        let cache = CacheHierarchy::from_spec(&[16, 1, 4]).unwrap();
        let mut cpu = Cpu::new(&image, cache, BufferSink::new());
        run(&mut cpu);
        assert_eq!(42, cpu.get_reg(RegId::from(2)));
        assert_eq!(42, cpu.get_reg(RegId::from(3)));
        assert_eq!(42, cpu.get_mem(60));
        let records = cpu.into_sink().into_inner();
        let seen: Vec<_> = records.iter().map(|r| (r.pc, r.addr, r.status)).collect();
        assert_eq!(
            vec![
                (1, 60, Status::Sw),
                (2, 60, Status::Miss),
                (3, 60, Status::Hit),
            ],
            seen
        );
        // blocksize 4, 4 lines: address 60 sits on line 3
        assert!(records.iter().all(|r| r.line == 3));
    }

    #[test]
    fn test_memory_wraps_effective_address() {
        let image = [
            0b001_000_001_0000111, // addi $1, $0, 7
            0b101_010_001_1111111, // sw $1, -1($2) ($2 = 0, wraps to 8191)
            0b010_0000000000010,   // j 2 (halt)
        ];
        let mut cpu = Cpu::new(&image, CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        assert_eq!(7, cpu.get_mem(8191));
    }

    #[test]
    fn test_state_view_format() {
        let image = [
            0b001_000_001_0000101, // addi $1, $0, 5
            0b010_0000000000001,   // j 1 (halt)
        ];
        let mut cpu = Cpu::new(&image, CacheHierarchy::disabled(), EmptySink::new());
        run(&mut cpu);
        let dump = cpu.state_view(8).to_string();
        let expected = "Final state:
\tpc=    1
\t$0=    0
\t$1=    5
\t$2=    0
\t$3=    0
\t$4=    0
\t$5=    0
\t$6=    0
\t$7=    0
2085 4001 0000 0000 0000 0000 0000 0000
";
        assert_eq!(expected, dump);
    }
}

use std::fmt;

use thiserror::Error;

use crate::common::Pc;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("cache {name}: {field} {value} is not a power of two")]
    NotPowerOfTwo {
        name: String,
        field: &'static str,
        value: u32,
    },
    #[error(
        "cache {name}: size {size} is not divisible by associativity {assoc} * blocksize {block}"
    )]
    NotDivisible {
        name: String,
        size: u32,
        assoc: u32,
        block: u32,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cache spec must hold 0, 3 or 6 values, found {0}")]
    BadArity(usize),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// shape of one cache level. immutable once validated.
#[derive(Debug, Clone)]
pub struct Geometry {
    name: String,
    size: u32,
    assoc: u32,
    block_size: u32,
    num_sets: u32,
    block_bits: u32,
    set_bits: u32,
}

impl Geometry {
    pub fn new(name: &str, size: u32, assoc: u32, block_size: u32) -> Result<Self, GeometryError> {
        let power_of_two = |field: &'static str, value: u32| {
            if value.is_power_of_two() {
                Ok(value)
            } else {
                Err(GeometryError::NotPowerOfTwo {
                    name: name.to_string(),
                    field,
                    value,
                })
            }
        };
        let assoc = power_of_two("associativity", assoc)?;
        let block_size = power_of_two("blocksize", block_size)?;
        let way_size = u64::from(assoc) * u64::from(block_size);
        if u64::from(size) % way_size != 0 {
            return Err(GeometryError::NotDivisible {
                name: name.to_string(),
                size,
                assoc,
                block: block_size,
            });
        }
        let num_sets = power_of_two("lines", (u64::from(size) / way_size) as u32)?;
        Ok(Self {
            name: name.to_string(),
            size,
            assoc,
            block_size,
            num_sets,
            block_bits: block_size.trailing_zeros(),
            set_bits: num_sets.trailing_zeros(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn num_sets(&self) -> u32 {
        self.num_sets
    }

    /// splits an address into `(tag, set index, block offset)`. pure
    /// shift/mask arithmetic; the power-of-two checks in [`Geometry::new`]
    /// make this exact.
    pub fn decompose(&self, addr: u16) -> (u32, usize, u32) {
        let addr = u32::from(addr);
        let offset = addr & (self.block_size - 1);
        let set_index = (addr >> self.block_bits) & (self.num_sets - 1);
        let tag = addr >> (self.block_bits + self.set_bits);
        (tag, set_index as usize, offset)
    }
}

/// one resident cache line. residency in a [`Set`] is what makes it valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    tag: u32,
}

/// blocks resident in one set, most-recently-used first.
struct Set {
    ways: usize,
    blocks: Vec<Block>,
}

impl Set {
    fn new(ways: usize) -> Self {
        Self {
            ways,
            blocks: Vec::with_capacity(ways),
        }
    }
    fn lookup(&self, tag: u32) -> Option<usize> {
        self.blocks.iter().position(|b| b.tag == tag)
    }
    /// promote the block holding `tag` to most-recently-used. no-op when
    /// the tag is absent.
    fn touch(&mut self, tag: u32) {
        if let Some(i) = self.lookup(tag) {
            let b = self.blocks.remove(i);
            self.blocks.insert(0, b);
        }
    }
    /// insert a block for `tag` at the most-recently-used position,
    /// evicting the least-recently-used block when the set is full.
    fn insert(&mut self, tag: u32) -> Option<u32> {
        let evicted = if self.blocks.len() == self.ways {
            self.blocks.pop().map(|b| b.tag)
        } else {
            None
        };
        self.blocks.insert(0, Block { tag });
        evicted
    }
    fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// one level of the hierarchy: a [`Set`] per line index.
///
/// policy: write-through with no allocation on a write miss. a read miss
/// allocates immediately; the data itself always comes from machine
/// memory, which stays authoritative under write-through, so blocks track
/// tags only.
pub struct CacheLevel {
    geometry: Geometry,
    sets: Vec<Set>,
}

impl CacheLevel {
    pub fn new(geometry: Geometry) -> Self {
        let sets = (0..geometry.num_sets)
            .map(|_| Set::new(geometry.assoc as usize))
            .collect();
        Self { geometry, sets }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read(&mut self, addr: u16) -> (bool, usize) {
        let (tag, set_index, _) = self.geometry.decompose(addr);
        let set = &mut self.sets[set_index];
        if set.lookup(tag).is_some() {
            set.touch(tag);
            (true, set_index)
        } else {
            if let Some(victim) = set.insert(tag) {
                log::trace!(
                    "{}: evicted tag {victim} from line {set_index}",
                    self.geometry.name
                );
            }
            (false, set_index)
        }
    }

    fn write(&mut self, addr: u16) -> (bool, usize) {
        let (tag, set_index, _) = self.geometry.decompose(addr);
        let set = &mut self.sets[set_index];
        if set.lookup(tag).is_some() {
            set.touch(tag);
            (true, set_index)
        } else {
            // no-allocate-on-write-miss: set membership is untouched
            (false, set_index)
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = &self.geometry;
        write!(
            f,
            "Cache {} has size {}, associativity {}, blocksize {}, lines {}",
            g.name, g.size, g.assoc, g.block_size, g.num_sets
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Hit,
    Miss,
    Sw,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Hit => write!(f, "HIT"),
            Status::Miss => write!(f, "MISS"),
            Status::Sw => write!(f, "SW"),
        }
    }
}

/// one log line: which level was consulted and what happened there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub level: String,
    pub status: Status,
    pub pc: u16,
    pub addr: u16,
    pub line: usize,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event = format!("{} {}", self.level, self.status);
        write!(
            f,
            "{event:<8} pc:{pc:5}\taddr:{addr:5}\tline:{line:4}",
            pc = self.pc,
            addr = self.addr,
            line = self.line
        )
    }
}

/// zero, one or two cache levels consulted in order. the machine hands in
/// `(pc, addr, kind)` and gets back one record per level touched; no other
/// state crosses the boundary.
pub struct CacheHierarchy {
    levels: Vec<CacheLevel>,
}

impl CacheHierarchy {
    /// builds a hierarchy from the flat `size,assoc,blocksize` spec: empty
    /// for no caching, three values for an L1, six for L1 and L2.
    pub fn from_spec(spec: &[u32]) -> Result<Self, ConfigError> {
        let levels = match *spec {
            [] => Vec::new(),
            [size, assoc, block] => vec![CacheLevel::new(Geometry::new("L1", size, assoc, block)?)],
            [l1_size, l1_assoc, l1_block, l2_size, l2_assoc, l2_block] => vec![
                CacheLevel::new(Geometry::new("L1", l1_size, l1_assoc, l1_block)?),
                CacheLevel::new(Geometry::new("L2", l2_size, l2_assoc, l2_block)?),
            ],
            _ => return Err(ConfigError::BadArity(spec.len())),
        };
        Ok(Self { levels })
    }

    pub fn disabled() -> Self {
        Self { levels: Vec::new() }
    }

    pub fn is_disabled(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &[CacheLevel] {
        &self.levels
    }

    /// routes one memory operation through the hierarchy and reports every
    /// level touched, in consult order (L1 before L2).
    ///
    /// a write goes through every level (write-through), logged `SW`
    /// whether it hit or not. a read stops at L1 on a hit and otherwise
    /// falls through to L2; each level's read miss has already allocated
    /// its own line, and the backing store always delivers, so no separate
    /// fill step exists.
    pub fn access(&mut self, pc: Pc, addr: u16, kind: AccessKind) -> Vec<AccessRecord> {
        let record = |level: &CacheLevel, status: Status, line: usize| AccessRecord {
            level: level.geometry.name.clone(),
            status,
            pc: pc.inner(),
            addr,
            line,
        };
        let mut records = Vec::with_capacity(self.levels.len());
        match kind {
            AccessKind::Write => {
                for level in &mut self.levels {
                    let (_, line) = level.write(addr);
                    records.push(record(level, Status::Sw, line));
                }
            }
            AccessKind::Read => {
                for level in &mut self.levels {
                    let (hit, line) = level.read(addr);
                    let status = if hit { Status::Hit } else { Status::Miss };
                    records.push(record(level, status, line));
                    if hit {
                        break;
                    }
                }
            }
        }
        records
    }
}

use core::fmt;

use crate::register::RegId;

/// represents one decoded instruction. immediates are sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    /// three register operands plus a low function code
    R {
        instr: RInstr,
        rs1: RegId,
        rs2: RegId,
        rd: RegId,
    },
    /// a register pair (`ra` = first encoded field, `rb` = second) plus a
    /// sign-extended 7-bit immediate
    Ri {
        instr: RiInstr,
        ra: RegId,
        rb: RegId,
        imm: u16,
    },
    /// a 13-bit immediate and nothing else
    J { instr: JInstr, imm: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RInstr {
    Add,
    Sub,
    And,
    Or,
    Slt,
    Jr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiInstr {
    Addi,
    Lw,
    Sw,
    Jeq,
    Slti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JInstr {
    J,
    Jal,
}

/// flat instruction identity, used to index bookkeeping tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Add,
    Sub,
    And,
    Or,
    Slt,
    Jr,
    Addi,
    Lw,
    Sw,
    Jeq,
    Slti,
    J,
    Jal,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 13] = [
        Mnemonic::Add,
        Mnemonic::Sub,
        Mnemonic::And,
        Mnemonic::Or,
        Mnemonic::Slt,
        Mnemonic::Jr,
        Mnemonic::Addi,
        Mnemonic::Lw,
        Mnemonic::Sw,
        Mnemonic::Jeq,
        Mnemonic::Slti,
        Mnemonic::J,
        Mnemonic::Jal,
    ];
}

impl Instr {
    pub fn mnemonic(&self) -> Mnemonic {
        match self {
            Instr::R { instr, .. } => match instr {
                RInstr::Add => Mnemonic::Add,
                RInstr::Sub => Mnemonic::Sub,
                RInstr::And => Mnemonic::And,
                RInstr::Or => Mnemonic::Or,
                RInstr::Slt => Mnemonic::Slt,
                RInstr::Jr => Mnemonic::Jr,
            },
            Instr::Ri { instr, .. } => match instr {
                RiInstr::Addi => Mnemonic::Addi,
                RiInstr::Lw => Mnemonic::Lw,
                RiInstr::Sw => Mnemonic::Sw,
                RiInstr::Jeq => Mnemonic::Jeq,
                RiInstr::Slti => Mnemonic::Slti,
            },
            Instr::J { instr, .. } => match instr {
                JInstr::J => Mnemonic::J,
                JInstr::Jal => Mnemonic::Jal,
            },
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mnemonic::Add => "add",
            Mnemonic::Sub => "sub",
            Mnemonic::And => "and",
            Mnemonic::Or => "or",
            Mnemonic::Slt => "slt",
            Mnemonic::Jr => "jr",
            Mnemonic::Addi => "addi",
            Mnemonic::Lw => "lw",
            Mnemonic::Sw => "sw",
            Mnemonic::Jeq => "jeq",
            Mnemonic::Slti => "slti",
            Mnemonic::J => "j",
            Mnemonic::Jal => "jal",
        };
        f.pad(s)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic();
        match *self {
            Instr::R {
                instr: RInstr::Jr,
                rs1,
                ..
            } => write!(f, "{m} {rs1}"),
            Instr::R { rs1, rs2, rd, .. } => write!(f, "{m} {rd}, {rs1}, {rs2}"),
            Instr::Ri {
                instr: RiInstr::Lw | RiInstr::Sw,
                ra,
                rb,
                imm,
            } => write!(f, "{m} {rb}, {imm}({ra})", imm = imm as i16),
            Instr::Ri {
                instr: RiInstr::Jeq,
                ra,
                rb,
                imm,
            } => write!(f, "{m} {ra}, {rb}, {imm}", imm = imm as i16),
            Instr::Ri { ra, rb, imm, .. } => write!(f, "{m} {rb}, {ra}, {imm}", imm = imm as i16),
            Instr::J { imm, .. } => write!(f, "{m} {imm}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let i = Instr::R {
            instr: RInstr::Add,
            rs1: RegId::from(1),
            rs2: RegId::from(2),
            rd: RegId::from(3),
        };
        assert_eq!("add $3, $1, $2", i.to_string());
        let i = Instr::Ri {
            instr: RiInstr::Lw,
            ra: RegId::from(5),
            rb: RegId::from(4),
            imm: -2i16 as u16,
        };
        assert_eq!("lw $4, -2($5)", i.to_string());
        let i = Instr::J {
            instr: JInstr::Jal,
            imm: 100,
        };
        assert_eq!("jal 100", i.to_string());
    }
}

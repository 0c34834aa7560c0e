use thiserror::Error;

use crate::{bin::*, instr::*, register::RegId};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("undefined instruction: `{0:#018b}`")]
    Undefined(u16),
}

impl Instr {
    /// returns which instr is encoded. the opcode lives in the top three
    /// bits; only the three-register format has unassigned function codes.
    pub fn decode_from(bin: u16) -> anyhow::Result<Self> {
        use Instr::*;
        let opcode = extract(bin, 13..15);
        Ok(match opcode {
            0b000 => {
                use RInstr::*;
                let instr = match mask_lower(bin, 3) {
                    0 => Add,
                    1 => Sub,
                    2 => And,
                    3 => Or,
                    4 => Slt,
                    8 => Jr,
                    _ => Err(DecodeError::Undefined(bin))?,
                };
                R {
                    instr,
                    rs1: RegId::from(extract(bin, 10..12)),
                    rs2: RegId::from(extract(bin, 7..9)),
                    rd: RegId::from(extract(bin, 4..6)),
                }
            }
            0b010 | 0b011 => J {
                instr: if opcode == 0b010 { JInstr::J } else { JInstr::Jal },
                imm: mask_lower(bin, 12),
            },
            _ => {
                use RiInstr::*;
                let instr = match opcode {
                    0b001 => Addi,
                    0b100 => Lw,
                    0b101 => Sw,
                    0b110 => Jeq,
                    _ => Slti, // 0b111; the 3-bit opcode space is exhausted
                };
                Ri {
                    instr,
                    ra: RegId::from(extract(bin, 10..12)),
                    rb: RegId::from(extract(bin, 7..9)),
                    imm: sign_extend::<7>(at(bin, 6), mask_lower(bin, 6)),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_three_register() {
        // add $3, $1, $2
        let bin = 0b000_001_010_011_0000;
        let i = Instr::decode_from(bin).unwrap();
        assert_eq!(
            Instr::R {
                instr: RInstr::Add,
                rs1: RegId::from(1),
                rs2: RegId::from(2),
                rd: RegId::from(3),
            },
            i
        );
        // jr $5
        let bin = 0b000_101_000_000_1000;
        assert_eq!(
            Instr::R {
                instr: RInstr::Jr,
                rs1: RegId::from(5),
                rs2: RegId::from(0),
                rd: RegId::from(0),
            },
            Instr::decode_from(bin).unwrap()
        );
    }

    #[test]
    fn test_decode_undefined_function_code() {
        let bin = 0b000_001_010_011_0101;
        let err = Instr::decode_from(bin).unwrap_err();
        assert!(err.downcast_ref::<DecodeError>().is_some());
    }

    #[test]
    fn test_decode_immediates_sign_extend() {
        // addi $2, $1, -3
        let bin = 0b001_001_010_1111101;
        assert_eq!(
            Instr::Ri {
                instr: RiInstr::Addi,
                ra: RegId::from(1),
                rb: RegId::from(2),
                imm: -3i16 as u16,
            },
            Instr::decode_from(bin).unwrap()
        );
        // lw $4, 5($3)
        let bin = 0b100_011_100_0000101;
        assert_eq!(
            Instr::Ri {
                instr: RiInstr::Lw,
                ra: RegId::from(3),
                rb: RegId::from(4),
                imm: 5,
            },
            Instr::decode_from(bin).unwrap()
        );
    }

    #[test]
    fn test_decode_jumps() {
        // j 100
        let bin = 0b010_0000001100100;
        assert_eq!(
            Instr::J {
                instr: JInstr::J,
                imm: 100,
            },
            Instr::decode_from(bin).unwrap()
        );
        // jal 8191 saturates the 13-bit field
        let bin = 0b011_1111111111111;
        assert_eq!(
            Instr::J {
                instr: JInstr::Jal,
                imm: 8191,
            },
            Instr::decode_from(bin).unwrap()
        );
    }
}

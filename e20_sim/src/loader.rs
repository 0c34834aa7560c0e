use nom::{
    bytes::complete::tag,
    character::complete::{one_of, u32 as dec_u32},
    multi::many1,
    IResult,
};
use thiserror::Error;

use crate::memory::MEM_SIZE;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("can't parse line {line_no}: `{content}`")]
    BadLine { line_no: usize, content: String },
    #[error("memory addresses encountered out of sequence: {found}")]
    OutOfSequence { found: usize },
    #[error("program too big for memory")]
    TooBig,
}

/// one `ram[N] = 16'b...;` row. anything after the semicolon is a comment.
fn machine_code_row(input: &str) -> IResult<&str, (usize, u16)> {
    let (input, _) = tag("ram[")(input)?;
    let (input, addr) = dec_u32(input)?;
    let (input, _) = tag("] = 16'b")(input)?;
    let (input, bits) = many1(one_of("01"))(input)?;
    let (input, _) = tag(";")(input)?;
    let word = bits
        .into_iter()
        .fold(0u16, |acc, b| (acc << 1) | u16::from(b == '1'));
    Ok((input, (addr as usize, word)))
}

/// parses a whole machine-code file into the program image, enforcing the
/// format's promise that rows are dense and start at address zero.
pub fn load_machine_code(src: &str) -> Result<Vec<u16>, LoadError> {
    let mut image = Vec::new();
    for (index, line) in src.lines().enumerate() {
        let (addr, word) = match machine_code_row(line) {
            Ok((_, row)) => row,
            Err(_) => {
                return Err(LoadError::BadLine {
                    line_no: index + 1,
                    content: line.to_string(),
                })
            }
        };
        if addr != image.len() {
            return Err(LoadError::OutOfSequence { found: addr });
        }
        if addr >= MEM_SIZE {
            return Err(LoadError::TooBig);
        }
        image.push(word);
    }
    log::info!("loaded {} cells of machine code", image.len());
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_rows() {
        let src = "\
ram[0] = 16'b0010010110000001;\t\t// movi $1,1
ram[1] = 16'b0100000000000000;
ram[2] = 16'b1110000000000000;";
        let image = load_machine_code(src).unwrap();
        assert_eq!(
            vec![0b0010010110000001, 0b0100000000000000, 0b1110000000000000],
            image
        );
    }

    #[test]
    fn test_reject_garbage_line() {
        let err = load_machine_code("ram[0] = 16'b0;\nnonsense").unwrap_err();
        assert!(matches!(err, LoadError::BadLine { line_no: 2, .. }));
    }

    #[test]
    fn test_reject_out_of_sequence() {
        let src = "ram[0] = 16'b0;\nram[2] = 16'b0;";
        assert!(matches!(
            load_machine_code(src).unwrap_err(),
            LoadError::OutOfSequence { found: 2 }
        ));
    }

    #[test]
    fn test_trailing_comment_is_ignored() {
        let image = load_machine_code("ram[0] = 16'b101; anything goes here").unwrap();
        assert_eq!(vec![0b101], image);
    }
}

use kernlink_kernel::ExecutionResult;

use crate::ansi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Input,
    Result,
    Stream,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBlock {
    pub kind: BlockKind,
    pub execution_count: Option<u32>,
    pub lines: Vec<String>,
}

impl DisplayBlock {
    fn new(kind: BlockKind, execution_count: Option<u32>, text: &str) -> Self {
        let lines = ansi::strip(text).lines().map(String::from).collect();

        Self {
            kind,
            execution_count,
            lines,
        }
    }
}

/// One block per kind present in `result`, in the order input, result,
/// stream, error.
pub fn format(result: &ExecutionResult) -> Vec<DisplayBlock> {
    let mut blocks = Vec::with_capacity(4);

    if let Some(input) = &result.input {
        blocks.push(DisplayBlock::new(
            BlockKind::Input,
            input.execution_count,
            &input.code,
        ));
    }

    if let Some(value) = &result.value {
        blocks.push(DisplayBlock::new(
            BlockKind::Result,
            value.execution_count,
            value.text().unwrap_or_default(),
        ));
    }

    if let Some(stream) = &result.stream {
        blocks.push(DisplayBlock::new(BlockKind::Stream, None, &stream.text));
    }

    if let Some(error) = &result.error {
        let text = if error.traceback.is_empty() {
            format!("{}: {}", error.ename, error.evalue)
        } else {
            error.traceback.join("\n")
        };
        blocks.push(DisplayBlock::new(BlockKind::Error, None, &text));
    }

    blocks
}

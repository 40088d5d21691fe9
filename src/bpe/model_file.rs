//! SentencePiece `ModelProto` 的最小解析器，只读取词表（字段 1）和训练参数中的模型类型。

use crate::error::VocabError;

/// SentencePiece 词的类型，与 `sentencepiece_model.proto` 中的编号一致。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PieceType {
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl PieceType {
    fn from_proto(v: u64) -> Self {
        match v {
            2 => Self::Unknown,
            3 => Self::Control,
            4 => Self::UserDefined,
            5 => Self::Unused,
            6 => Self::Byte,
            _ => Self::Normal,
        }
    }
}

/// `TrainerSpec.model_type`，字段缺省时为 Unigram。
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub(crate) enum ModelType {
    #[default]
    Unigram,
    Bpe,
    Word,
    Char,
}

impl ModelType {
    fn from_proto(v: u64) -> Self {
        match v {
            2 => Self::Bpe,
            3 => Self::Word,
            4 => Self::Char,
            _ => Self::Unigram,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unigram => "UNIGRAM",
            Self::Bpe => "BPE",
            Self::Word => "WORD",
            Self::Char => "CHAR",
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct ProtoModel<'a> {
    pub pieces: Vec<ProtoPiece<'a>>,
    pub model_type: ModelType,
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct ProtoPiece<'a> {
    pub piece: &'a str,
    pub score: f32,
    pub ty: PieceType,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[inline]
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, VocabError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let &b = self
                .buf
                .get(self.pos)
                .ok_or(VocabError::Truncated(self.pos))?;
            self.pos += 1;
            value |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(VocabError::Truncated(self.pos))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], VocabError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(VocabError::Truncated(self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// 读取字段头，返回字段编号和 wire type
    fn key(&mut self) -> Result<(u64, u8), VocabError> {
        let key = self.varint()?;
        Ok((key >> 3, (key & 7) as u8))
    }

    fn skip(&mut self, wire: u8) -> Result<(), VocabError> {
        let pos = self.pos;
        match wire {
            0 => self.varint().map(drop),
            1 => self.take(8).map(drop),
            2 => {
                let len = self.varint()? as usize;
                self.take(len).map(drop)
            }
            5 => self.take(4).map(drop),
            _ => Err(VocabError::WireType { wire, pos }),
        }
    }

    fn bytes(&mut self) -> Result<&'a [u8], VocabError> {
        let len = self.varint()? as usize;
        self.take(len)
    }
}

/// 解析 `tokenizer.model` 文件中的全部词和模型类型。
pub(crate) fn parse_model(model: &[u8]) -> Result<ProtoModel<'_>, VocabError> {
    let mut reader = Reader::new(model);
    let mut pieces = Vec::new();
    let mut model_type = ModelType::default();
    while !reader.is_empty() {
        match reader.key()? {
            (1, 2) => {
                let offset = reader.pos;
                let message = reader.bytes()?;
                pieces.push(parse_piece(message, offset)?);
            }
            (2, 2) => model_type = parse_trainer_spec(reader.bytes()?)?,
            (_, wire) => reader.skip(wire)?,
        }
    }
    if pieces.is_empty() {
        return Err(VocabError::Empty);
    }
    Ok(ProtoModel { pieces, model_type })
}

/// 只关心 `TrainerSpec` 的字段 3
fn parse_trainer_spec(message: &[u8]) -> Result<ModelType, VocabError> {
    let mut reader = Reader::new(message);
    let mut model_type = ModelType::default();
    while !reader.is_empty() {
        match reader.key()? {
            (3, 0) => model_type = ModelType::from_proto(reader.varint()?),
            (_, wire) => reader.skip(wire)?,
        }
    }
    Ok(model_type)
}

fn parse_piece(message: &[u8], offset: usize) -> Result<ProtoPiece<'_>, VocabError> {
    let mut reader = Reader::new(message);
    let mut piece = ProtoPiece {
        piece: "",
        score: 0.,
        ty: PieceType::Normal,
    };
    while !reader.is_empty() {
        match reader.key()? {
            (1, 2) => {
                let pos = offset + reader.pos;
                piece.piece =
                    std::str::from_utf8(reader.bytes()?).map_err(|_| VocabError::Utf8(pos))?;
            }
            (2, 5) => {
                let raw = reader.take(4)?;
                piece.score = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
            (3, 0) => piece.ty = PieceType::from_proto(reader.varint()?),
            (_, wire) => reader.skip(wire)?,
        }
    }
    Ok(piece)
}

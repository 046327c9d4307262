//! PDF object parser.
//!
//! Recursive descent over [`Lexer`] tokens, building [`PdfObject`] values.
//! Indirect references (`N G R`) need two tokens of lookahead, held in a
//! small pushback queue.

use super::lexer::{Keyword, Lexer, Token};
use super::object::{Dict, ObjRef, PdfObject, PdfStream};
use crate::error::{Result, RptError};
use std::collections::VecDeque;

pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    pushback: VecDeque<(usize, Token)>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::new(data, pos),
            pushback: VecDeque::new(),
        }
    }

    /// Byte position of the next unconsumed token, or the raw cursor.
    pub fn pos(&self) -> usize {
        self.pushback
            .front()
            .map_or(self.lexer.pos(), |(pos, _)| *pos)
    }

    fn next(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(entry) = self.pushback.pop_front() {
            return Ok(Some(entry));
        }
        self.lexer.next_token()
    }

    fn push_back(&mut self, entry: (usize, Token)) {
        self.pushback.push_front(entry);
    }

    fn expect(&mut self, what: &str) -> Result<(usize, Token)> {
        self.next()?
            .ok_or_else(|| RptError::InvalidRpt(format!("unexpected end of PDF while reading {what}")))
    }

    /// Parse one complete object at the cursor.
    pub fn parse_object(&mut self) -> Result<PdfObject> {
        let (pos, token) = self.expect("object")?;
        self.parse_from(pos, token)
    }

    fn parse_from(&mut self, pos: usize, token: Token) -> Result<PdfObject> {
        match token {
            Token::Int(n) => self.try_reference(n, pos),
            Token::Real(x) => Ok(PdfObject::Real(x)),
            Token::Name(name) => Ok(PdfObject::Name(name)),
            Token::String(bytes) => Ok(PdfObject::String(bytes)),
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => self.parse_dict_or_stream(),
            Token::Keyword(Keyword::True) => Ok(PdfObject::Bool(true)),
            Token::Keyword(Keyword::False) => Ok(PdfObject::Bool(false)),
            Token::Keyword(Keyword::Null) => Ok(PdfObject::Null),
            other => Err(RptError::InvalidRpt(format!(
                "unexpected token {other:?} at {pos}"
            ))),
        }
    }

    /// An integer may begin an `N G R` reference; otherwise it stands alone.
    fn try_reference(&mut self, first: i64, _pos: usize) -> Result<PdfObject> {
        let Some(second) = self.next()? else {
            return Ok(PdfObject::Int(first));
        };
        if let Token::Int(genno) = second.1 {
            match self.next()? {
                Some((_, Token::Keyword(Keyword::R))) => {
                    let objid = u32::try_from(first).map_err(|_| {
                        RptError::InvalidRpt(format!("bad object id {first} in reference"))
                    })?;
                    return Ok(PdfObject::Ref(ObjRef::new(objid, genno as u16)));
                }
                Some(third) => {
                    self.push_back(third);
                    self.push_back(second);
                }
                None => self.push_back(second),
            }
        } else {
            self.push_back(second);
        }
        Ok(PdfObject::Int(first))
    }

    fn parse_array(&mut self) -> Result<PdfObject> {
        let mut items = Vec::new();
        loop {
            let (pos, token) = self.expect("array")?;
            if token == Token::ArrayEnd {
                return Ok(PdfObject::Array(items));
            }
            items.push(self.parse_from(pos, token)?);
        }
    }

    fn parse_dict_or_stream(&mut self) -> Result<PdfObject> {
        let mut dict = Dict::new();
        loop {
            let (pos, token) = self.expect("dict")?;
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value = self.parse_object()?;
                    dict.insert(key, value);
                }
                other => {
                    return Err(RptError::InvalidRpt(format!(
                        "dict key must be a name, got {other:?} at {pos}"
                    )));
                }
            }
        }

        // A dict directly followed by `stream` carries a data payload.
        match self.next()? {
            Some((_, Token::Keyword(Keyword::Stream))) => {
                let rawdata = self.read_stream_payload(&dict)?;
                Ok(PdfObject::Stream(Box::new(PdfStream::new(dict, rawdata))))
            }
            Some(entry) => {
                self.push_back(entry);
                Ok(PdfObject::Dict(dict))
            }
            None => Ok(PdfObject::Dict(dict)),
        }
    }

    /// Read stream bytes, trusting a direct /Length but recovering from a
    /// missing or indirect one by scanning for `endstream`.
    fn read_stream_payload(&mut self, attrs: &Dict) -> Result<Vec<u8>> {
        debug_assert!(self.pushback.is_empty());
        self.lexer.skip_stream_eol();

        if let Some(PdfObject::Int(len)) = attrs.get("Length")
            && *len >= 0
        {
            let save = self.lexer.pos();
            if let Ok(raw) = self.lexer.take_raw(*len as usize) {
                let raw = raw.to_vec();
                // The payload must be followed by endstream (after EOL).
                if let Ok(Some((_, Token::Keyword(Keyword::EndStream)))) = self.lexer.next_token() {
                    return Ok(raw);
                }
            }
            self.lexer.seek(save);
        }

        let end = self
            .lexer
            .find_endstream()
            .ok_or_else(|| RptError::InvalidRpt("stream without endstream".into()))?;
        let start = self.lexer.pos();
        let mut raw = self.lexer.take_raw(end - start)?.to_vec();
        self.lexer.take_raw(b"endstream".len())?;
        // Drop the EOL that separates data from the keyword.
        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Ok(raw)
    }

    /// Parse `N G obj ... endobj` at the cursor.
    pub fn parse_indirect(&mut self) -> Result<(ObjRef, PdfObject)> {
        let (pos, token) = self.expect("indirect object")?;
        let Token::Int(objid) = token else {
            return Err(RptError::InvalidRpt(format!(
                "expected object id at {pos}"
            )));
        };
        let (pos, token) = self.expect("generation number")?;
        let Token::Int(genno) = token else {
            return Err(RptError::InvalidRpt(format!(
                "expected generation number at {pos}"
            )));
        };
        let (pos, token) = self.expect("obj keyword")?;
        if token != Token::Keyword(Keyword::Obj) {
            return Err(RptError::InvalidRpt(format!(
                "expected 'obj' at {pos}, got {token:?}"
            )));
        }

        let object = self.parse_object()?;

        // Tolerate a missing endobj; some writers omit it after streams.
        if let Some(entry) = self.next()? {
            if entry.1 != Token::Keyword(Keyword::EndObj) {
                self.push_back(entry);
            }
        }

        let objid = u32::try_from(objid)
            .map_err(|_| RptError::InvalidRpt(format!("bad object id {objid}")))?;
        Ok((ObjRef::new(objid, genno as u16), object))
    }
}

use super::{bits, follow, Frame, L1Codec};
use crate::error::DecodeError;
use crate::l0::Variant;
use crate::oligo::{distance, find, find_prefix, Nt, Oligo, ShortOligo};
use crate::trie::SearchCtx;

/// A validated header: the word values so far, where the data words start, and
/// the corrected metadata bytes
struct Header {
    values: Vec<u64>,
    pos: usize,
    prefix: ShortOligo,
    metadata: Vec<u8>,
}

/// State of the depth-first header search
struct HeaderSearch<'a> {
    codec: &'a L1Codec,
    body: &'a [Nt],
    lengths: &'a [usize],
    vnum: usize,
    maxdist: usize,
    values: Vec<u64>,
    ctx: &'a mut SearchCtx,
}
impl HeaderSearch<'_> {
    fn run(&mut self, word: usize, pos: usize, prefix: ShortOligo) -> Option<Header> {
        if !self.ctx.tick(1) {
            return None;
        }
        let codec = self.codec;
        if word == codec.hwords {
            let cslen = codec.checksum.len();
            let bytes = bits::unpack(&self.values, codec.l0.bits(), codec.mdnum + cslen);
            let metadata = codec
                .checker
                .validate(&bytes[..codec.mdnum], &bytes[codec.mdnum..])?;
            return Some(Header {
                values: self.values.clone(),
                pos,
                prefix,
                metadata,
            });
        }

        let bits = codec.l0.bits();
        let plen = codec.l0.prefix_len();
        for &len in self.lengths {
            if pos + len > self.body.len() {
                continue;
            }
            let segment = &self.body[pos..pos + len];
            let Ok(variants) = codec.l0.decode(&prefix, segment, self.maxdist, self.ctx) else {
                continue;
            };
            for variant in variants.iter().take(self.vnum) {
                if variant.value >> bits != 0 {
                    continue;
                }
                let Ok(next) = follow(prefix, &variant.word, plen) else {
                    continue;
                };
                self.values.push(variant.value);
                let found = self.run(word + 1, pos + len, next);
                self.values.pop();
                if found.is_some() {
                    return found;
                }
            }
            if self.ctx.is_dead() {
                return None;
            }
        }
        None
    }
}

impl L1Codec {
    /// Decodes an observed oligo with the codec's deadline
    ///
    /// `difficulty` widens the search: `difficulty + 1` variants per header word,
    /// a slow-path edit bound of `difficulty + 1`, and word lengths `L ± 1` even
    /// when the body has the expected length.
    pub fn decode(&self, observed: &[Nt], difficulty: usize) -> Result<Frame, DecodeError> {
        let mut ctx = SearchCtx::with_timeout(self.max_time);
        self.decode_with(observed, difficulty, &mut ctx)
    }

    /// Decodes an observed oligo under an explicit search context
    pub fn decode_with(
        &self,
        observed: &[Nt],
        difficulty: usize,
        ctx: &mut SearchCtx,
    ) -> Result<Frame, DecodeError> {
        let body = self.trim(observed)?;
        let olen = self.l0.oligo_len();
        let lengths: Vec<usize> = if difficulty == 0 && body.len() == self.body_len() {
            vec![olen]
        } else {
            [olen, olen.saturating_sub(1), olen + 1]
                .into_iter()
                .filter(|&len| len > 0)
                .collect()
        };

        let mut search = HeaderSearch {
            codec: self,
            body,
            lengths: &lengths,
            vnum: difficulty + 1,
            maxdist: difficulty + 1,
            values: Vec::with_capacity(self.nwords),
            ctx,
        };
        let Some(header) = search.run(0, 0, self.prefix) else {
            return Err(if ctx.is_dead() {
                DecodeError::Timeout
            } else {
                DecodeError::MetadataUnrecoverable
            });
        };

        let values = self.decode_data(
            body,
            header.values,
            header.pos,
            header.prefix,
            &lengths,
            difficulty,
            ctx,
        )?;
        let cslen = self.checksum.len();
        let bytes = bits::unpack(&values, self.l0.bits(), self.mdnum + cslen + self.dnum);

        let mut md = [0u8; 8];
        md[..self.mdnum].copy_from_slice(&header.metadata);
        let metadata = u64::from_le_bytes(md);
        let max = self.max_addr();
        let scrambled = metadata & (2 * max) != 0;
        let mut data = bytes[self.mdnum + cslen..].to_vec();
        if scrambled {
            data.iter_mut().for_each(|b| *b = !*b);
        }
        Ok(Frame {
            addr: metadata & (max - 1),
            erasure: metadata & max != 0,
            scrambled,
            data,
        })
    }

    /// Greedy decoding of the words after the header
    ///
    /// For each word the segment length (among `lengths`) whose best variant is
    /// closest to its canonical word wins; unreadable words decode as zero.
    #[allow(clippy::too_many_arguments)]
    fn decode_data(
        &self,
        body: &[Nt],
        mut values: Vec<u64>,
        mut pos: usize,
        mut prefix: ShortOligo,
        lengths: &[usize],
        difficulty: usize,
        ctx: &mut SearchCtx,
    ) -> Result<Vec<u64>, DecodeError> {
        let olen = self.l0.oligo_len();
        let plen = self.l0.prefix_len();
        for word in self.hwords..self.nwords {
            let remaining = body.len().saturating_sub(pos);
            if remaining == 0 {
                if word == self.hwords {
                    return Err(DecodeError::InternalInconsistency);
                }
                values.push(0);
                continue;
            }

            let mut best: Option<(usize, usize, Variant)> = None;
            for &len in lengths {
                let len = len.min(remaining);
                let segment = &body[pos..pos + len];
                let variants = self
                    .l0
                    .decode(&prefix, segment, difficulty + 1, ctx)
                    .unwrap_or_default();
                if let Some(top) = variants.first() {
                    let dist = distance(segment, &top.word.to_nts());
                    if best.map_or(true, |(d, _, _)| dist < d) {
                        best = Some((dist, len, *top));
                    }
                }
            }

            match best {
                Some((_, len, variant)) => {
                    values.push(variant.value);
                    prefix = follow(prefix, &variant.word, plen).unwrap_or(prefix);
                    pos += len;
                }
                None => {
                    values.push(0);
                    let len = olen.min(remaining);
                    let segment = &body[pos + len - plen.min(len)..pos + len];
                    prefix = ShortOligo::from_nts(segment)
                        .ok()
                        .and_then(|observed| follow(prefix, &observed, plen).ok())
                        .unwrap_or(prefix);
                    pos += len;
                }
            }
        }
        Ok(values)
    }

    /// Locates the primers and returns the body between them
    fn trim<'a>(&self, observed: &'a [Nt]) -> Result<&'a [Nt], DecodeError> {
        let end5 = find_prefix(observed, self.p5.as_slice(), self.primer_errors)
            .ok_or(DecodeError::PrimerMismatch)?;
        let rest = &observed[end5..];
        let (pos3, _) = find(rest, self.p3.as_slice(), self.primer_errors, self.body_len())
            .ok_or(DecodeError::PrimerMismatch)?;
        Ok(&rest[..pos3])
    }
}

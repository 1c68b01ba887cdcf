//! Single byte-range requests (`Range: bytes=<start>-[<end>]`).

use crate::http::{response::Response, types::StatusCode};

/// How a `Range` header applies to a representation of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range: send the whole representation.
    Full,
    /// Inclusive byte range inside the representation.
    Partial { start: usize, end: usize },
    /// The header is syntactically broken (`400`).
    Malformed,
    /// The range lies outside the representation (`416`).
    Unsatisfiable,
}

impl ByteRange {
    /// Evaluates a `Range` header against a representation of `size` bytes.
    ///
    /// Only a single `bytes=` range is understood; anything else (other
    /// units, multiple ranges) yields [`ByteRange::Full`]. The end is
    /// inclusive and defaults to the last byte.
    ///
    /// ```
    /// use ferrule::range::ByteRange;
    ///
    /// assert_eq!(ByteRange::parse(Some("bytes=0-4"), 10), ByteRange::Partial { start: 0, end: 4 });
    /// assert_eq!(ByteRange::parse(Some("bytes=5-"), 10), ByteRange::Partial { start: 5, end: 9 });
    /// assert_eq!(ByteRange::parse(Some("bytes=0-20"), 10), ByteRange::Unsatisfiable);
    /// assert_eq!(ByteRange::parse(Some("bytes=0-1,4-5"), 10), ByteRange::Full);
    /// ```
    pub fn parse(header: Option<&str>, size: usize) -> Self {
        let Some(spec) = header
            .filter(|h| !h.contains(','))
            .and_then(|h| h.strip_prefix("bytes="))
        else {
            return ByteRange::Full;
        };

        let mut parts = spec.split('-');
        let (Some(start), end, None) = (parts.next(), parts.next(), parts.next()) else {
            return ByteRange::Malformed;
        };

        let Ok(start) = start.trim().parse::<usize>() else {
            return ByteRange::Malformed;
        };

        let end = match end.map(str::trim) {
            None | Some("") => size.checked_sub(1),
            Some(end) => match end.parse::<usize>() {
                Ok(end) => Some(end),
                Err(_) => return ByteRange::Malformed,
            },
        };

        match end {
            Some(end) if start <= end && end < size => ByteRange::Partial { start, end },
            _ => ByteRange::Unsatisfiable,
        }
    }
}

/// Answers with `data` or the slice of it selected by `range_header`.
///
/// Sets `200` with the whole body, `206` with `Content-Range`, or one of the
/// error pages `400` / `416`. `Accept-Ranges: bytes` is always advertised.
pub fn respond(res: &mut Response, range_header: Option<&str>, data: Vec<u8>) {
    let size = data.len();
    res.set_header("accept-ranges", "bytes");

    match ByteRange::parse(range_header, size) {
        ByteRange::Full => {
            res.set_status(StatusCode::Ok).set_body(data);
        }
        ByteRange::Partial { start, end } => {
            let mut data = data;
            data.truncate(end + 1);
            data.drain(..start);

            res.set_status(StatusCode::PartialContent)
                .set_header("content-range", format!("bytes {start}-{end}/{size}"))
                .set_body(data);
        }
        ByteRange::Malformed => {
            res.send(StatusCode::BadRequest);
        }
        ByteRange::Unsatisfiable => {
            res.send(StatusCode::RequestedRangeNotSatisfiable)
                .set_header("content-range", format!("bytes */{size}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        #[rustfmt::skip]
        let cases = [
            (None,                   ByteRange::Full),
            (Some("items=0-4"),      ByteRange::Full),
            (Some("bytes=0-1,3-4"),  ByteRange::Full),
            (Some("bytes=0-4"),      ByteRange::Partial { start: 0, end: 4 }),
            (Some("bytes=3-3"),      ByteRange::Partial { start: 3, end: 3 }),
            (Some("bytes=2-"),       ByteRange::Partial { start: 2, end: 9 }),
            (Some("bytes=0-9"),      ByteRange::Partial { start: 0, end: 9 }),
            (Some("bytes=0-10"),     ByteRange::Unsatisfiable),
            (Some("bytes=0-20"),     ByteRange::Unsatisfiable),
            (Some("bytes=10-"),      ByteRange::Unsatisfiable),
            (Some("bytes=5-2"),      ByteRange::Unsatisfiable),
            (Some("bytes=a-4"),      ByteRange::Malformed),
            (Some("bytes=0-b"),      ByteRange::Malformed),
            (Some("bytes=-4"),       ByteRange::Malformed),
            (Some("bytes=0-4-5"),    ByteRange::Malformed),
            (Some("bytes="),         ByteRange::Malformed),
        ];

        for (header, expected) in cases {
            assert_eq!(ByteRange::parse(header, 10), expected, "{header:?}");
        }
    }

    #[test]
    fn empty_representation() {
        assert_eq!(ByteRange::parse(Some("bytes=0-"), 0), ByteRange::Unsatisfiable);
        assert_eq!(ByteRange::parse(None, 0), ByteRange::Full);
    }

    #[test]
    fn respond_partial() {
        let mut res = Response::new();
        respond(&mut res, Some("bytes=0-4"), b"0123456789".to_vec());

        assert_eq!(res.status(), StatusCode::PartialContent);
        assert_eq!(res.header("content-range"), Some("bytes 0-4/10"));
        assert_eq!(res.header("content-length"), Some("5"));
        assert_eq!(res.body(), b"01234");

        let mut res = Response::new();
        respond(&mut res, Some("bytes=6-"), b"0123456789".to_vec());
        assert_eq!(res.header("content-range"), Some("bytes 6-9/10"));
        assert_eq!(res.body(), b"6789");
    }

    #[test]
    fn respond_errors() {
        let mut res = Response::new();
        respond(&mut res, Some("bytes=0-20"), b"0123456789".to_vec());
        assert_eq!(res.status(), StatusCode::RequestedRangeNotSatisfiable);
        assert_eq!(res.header("content-range"), Some("bytes */10"));

        let mut res = Response::new();
        respond(&mut res, Some("bytes=x-1"), b"0123456789".to_vec());
        assert_eq!(res.status(), StatusCode::BadRequest);

        let mut res = Response::new();
        respond(&mut res, None, b"0123456789".to_vec());
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body(), b"0123456789");
        assert_eq!(res.header("accept-ranges"), Some("bytes"));
    }
}

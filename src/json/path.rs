/// A parsed reference into the context stack.
///
/// `Relative` covers plain names, `this`/`.` and `../` ascension, `Local`
/// covers the `@`-prefixed data variables such as `@index` or `@root.a`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Path {
    Relative {
        ups: usize,
        segs: Vec<String>,
        explicit_this: bool,
        raw: String,
    },
    Local {
        ups: usize,
        name: String,
        segs: Vec<String>,
        raw: String,
    },
}

enum Seg {
    Key(String),
    Literal(String),
}

impl Path {
    pub fn parse(raw: &str) -> Result<Path, String> {
        let (local, mut rest) = match raw.strip_prefix('@') {
            Some(r) => (true, r),
            None => (false, raw),
        };

        let mut ups = 0;
        loop {
            if let Some(r) = rest.strip_prefix("../") {
                ups += 1;
                rest = r;
            } else if rest == ".." {
                ups += 1;
                rest = "";
            } else {
                break;
            }
        }

        let mut explicit_this = ups > 0;
        if !local {
            if rest == "." || rest == "this" {
                rest = "";
                explicit_this = true;
            } else if let Some(r) = rest.strip_prefix("./") {
                rest = r;
                explicit_this = true;
            } else if let Some(r) = rest
                .strip_prefix("this.")
                .or_else(|| rest.strip_prefix("this/"))
            {
                rest = r;
                explicit_this = true;
            }
        }

        let segs = split_segments(rest).map_err(|e| format!("{e} in path {raw:?}"))?;

        if local {
            let mut names = segs.into_iter().map(|s| match s {
                Seg::Key(k) | Seg::Literal(k) => k,
            });
            let name = names
                .next()
                .ok_or_else(|| format!("missing data name in {raw:?}"))?;
            Ok(Path::Local {
                ups,
                name,
                segs: names.collect(),
                raw: raw.to_owned(),
            })
        } else {
            if segs.is_empty() && !explicit_this {
                return Err(format!("empty path {raw:?}"));
            }
            Ok(Path::Relative {
                ups,
                segs: segs
                    .into_iter()
                    .map(|s| match s {
                        Seg::Key(k) | Seg::Literal(k) => k,
                    })
                    .collect(),
                explicit_this,
                raw: raw.to_owned(),
            })
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Path::Relative { raw, .. } | Path::Local { raw, .. } => raw,
        }
    }

    /// A single bare identifier, the only path form that may name a helper.
    pub fn simple_name(&self) -> Option<&str> {
        match self {
            Path::Relative {
                ups: 0,
                segs,
                explicit_this: false,
                raw,
            } if segs.len() == 1 && !raw.starts_with('[') => Some(&segs[0]),
            _ => None,
        }
    }

    pub fn ups(&self) -> usize {
        match self {
            Path::Relative { ups, .. } | Path::Local { ups, .. } => *ups,
        }
    }
}

fn split_segments(s: &str) -> Result<Vec<Seg>, String> {
    let mut segs = Vec::new();
    let mut rest = s;

    while !rest.is_empty() {
        if let Some(inner) = rest.strip_prefix('[') {
            let end = inner
                .find(']')
                .ok_or_else(|| "unclosed '['".to_owned())?;
            segs.push(Seg::Literal(inner[..end].to_owned()));
            rest = &inner[end + 1..];
        } else {
            let end = rest.find(['.', '/']).unwrap_or(rest.len());
            let key = &rest[..end];
            if key.is_empty() || key == ".." {
                return Err("empty segment".to_owned());
            }
            segs.push(Seg::Key(key.to_owned()));
            rest = &rest[end..];
        }

        if let Some(r) = rest.strip_prefix(['.', '/']) {
            if r.is_empty() {
                return Err("trailing separator".to_owned());
            }
            rest = r;
        } else if !rest.is_empty() {
            return Err(format!("unexpected {rest:?}"));
        }
    }

    Ok(segs)
}

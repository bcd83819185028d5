//! Lazy filtering over a feature stream with a small set of composable
//! predicates and terminal operations.

use crate::errors::Error;
use crate::gtf::GtfFeature;

/// A genomic region in `chr:start-end` form, 1-based inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Region {
    /// Parses `"chr1:1000-2000"`.
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let (chrom, range) = spec
            .split_once(':')
            .ok_or_else(|| Error::new_gtf(format!("region '{spec}' lacks a ':'"), 0))?;
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| Error::new_gtf(format!("region '{spec}' lacks a '-'"), 0))?;
        let start: u64 = start
            .parse()
            .map_err(|_| Error::new_gtf(format!("region start '{start}' is not a number"), 0))?;
        let end: u64 = end
            .parse()
            .map_err(|_| Error::new_gtf(format!("region end '{end}' is not a number"), 0))?;
        if chrom.is_empty() || start < 1 || end < start {
            return Err(Error::new_gtf(format!("region '{spec}' is not valid"), 0));
        }
        Ok(Self {
            chrom: chrom.to_string(),
            start,
            end,
        })
    }
}

#[derive(Debug, Clone)]
enum Filter {
    Chromosome(String),
    FeatureType(String),
    GeneType(String),
    Within(Region),
}

impl Filter {
    fn matches(&self, feature: &GtfFeature) -> bool {
        match self {
            Filter::Chromosome(chrom) => feature.seqname == *chrom,
            Filter::FeatureType(kind) => feature.feature == *kind,
            Filter::GeneType(kind) => {
                let gene_type = feature
                    .normalized
                    .as_ref()
                    .and_then(|n| n.gene_type.as_deref())
                    .or_else(|| feature.attr("gene_type"))
                    .or_else(|| feature.attr("gene_biotype"));
                gene_type == Some(kind.as_str())
            }
            Filter::Within(region) => {
                feature.seqname == region.chrom && feature.overlaps(region.start, region.end)
            }
        }
    }
}

/// Composable lazy query over any feature stream. Filters are conjunctive;
/// nothing is pulled from the source until a terminal operation (or
/// iteration) runs.
pub struct GtfQuery<I> {
    inner: I,
    filters: Vec<Filter>,
}

impl<I> GtfQuery<I>
where
    I: Iterator<Item = Result<GtfFeature, Error>>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            filters: Vec::new(),
        }
    }

    pub fn chromosome(mut self, chrom: &str) -> Self {
        self.filters.push(Filter::Chromosome(chrom.to_string()));
        self
    }

    pub fn feature_type(mut self, kind: &str) -> Self {
        self.filters.push(Filter::FeatureType(kind.to_string()));
        self
    }

    pub fn gene_type(mut self, kind: &str) -> Self {
        self.filters.push(Filter::GeneType(kind.to_string()));
        self
    }

    /// Restrict to features overlapping `chr:start-end`.
    pub fn region(mut self, spec: &str) -> Result<Self, Error> {
        self.filters.push(Filter::Within(Region::parse(spec)?));
        Ok(self)
    }

    fn matches(filters: &[Filter], feature: &GtfFeature) -> bool {
        filters.iter().all(|f| f.matches(feature))
    }

    /// Collects every matching feature.
    pub fn collect(self) -> Result<Vec<GtfFeature>, Error> {
        let mut out = Vec::new();
        for item in self {
            out.push(item?);
        }
        Ok(out)
    }

    /// Counts matching features without keeping them.
    pub fn count(self) -> Result<usize, Error> {
        let mut n = 0;
        for item in self {
            item?;
            n += 1;
        }
        Ok(n)
    }

    /// The first matching feature, pulling no more input than needed.
    pub fn first(mut self) -> Result<Option<GtfFeature>, Error> {
        match Iterator::next(&mut self) {
            None => Ok(None),
            Some(item) => item.map(Some),
        }
    }
}

impl<I> Iterator for GtfQuery<I>
where
    I: Iterator<Item = Result<GtfFeature, Error>>,
{
    type Item = Result<GtfFeature, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Err(e) => return Some(Err(e)),
                Ok(feature) => {
                    if Self::matches(&self.filters, &feature) {
                        return Some(Ok(feature));
                    }
                }
            }
        }
    }
}

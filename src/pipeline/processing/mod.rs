// Pipeline processing: field normalization and similarity grouping

pub mod normalize;
pub mod similarity;

//! Binary-side test suite: end-to-end scenarios through the full
//! classify → assemble → accumulate pipeline.

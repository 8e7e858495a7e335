//! Integration scenarios for `conclave` live under `tests/`.

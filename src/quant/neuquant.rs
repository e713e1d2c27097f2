//! NEUQUANT Neural-Net quantization algorithm by Anthony Dekker, 1994.
//! See "Kohonen neural networks for optimal colour quantization"
//! in "Network: Computation in Neural Systems" Vol. 5 (1994) pp 351-367.
//! for a discussion of the algorithm.

/* NeuQuant Neural-Net Quantization Algorithm
 * ------------------------------------------
 *
 * Copyright (c) 1994 Anthony Dekker
 *
 * NEUQUANT Neural-Net quantization algorithm by Anthony Dekker, 1994.
 * See "Kohonen neural networks for optimal colour quantization"
 * in "Network: Computation in Neural Systems" Vol. 5 (1994) pp 351-367.
 * for a discussion of the algorithm.
 *
 * Any party obtaining a copy of these files from the author, directly or
 * indirectly, is granted, free of charge, a full and unrestricted irrevocable,
 * world-wide, paid up, royalty-free, nonexclusive right and license to deal
 * in this software and documentation files (the "Software"), including without
 * limitation the rights to use, copy, modify, merge, publish, distribute, sublicense,
 * and/or sell copies of the Software, and to permit persons who receive
 * copies from any such party to do so, with the only requirement being
 * that this copyright notice remain intact.
 */

use std::cmp;

use crate::error::{EncodingError, Result};
use crate::types::Rgb;

use super::Interrupt;

/// Number of colours used
pub const NETSIZE: usize = 256;

// four primes near 500 - assume no image has a length so large
// that it is divisible by all four primes
const PRIME1: usize = 499;
const PRIME2: usize = 491;
const PRIME3: usize = 487;
const PRIME4: usize = 503;
/// Minimum size for input image, smaller buffers are sampled exhaustively
const MIN_PICTURE_BYTES: usize = 3 * PRIME4;

const MAX_NETPOS: usize = NETSIZE - 1;
/// Bias for colour values
const NET_BIAS_SHIFT: i32 = 4;
const N_CYCLES: usize = 100;

// freq and bias
const INT_BIAS_SHIFT: i32 = 16;
const INT_BIAS: i32 = 1 << INT_BIAS_SHIFT;
const GAMMA_SHIFT: i32 = 10;
const BETA_SHIFT: i32 = 10;
const BETA: i32 = INT_BIAS >> BETA_SHIFT;
const BETA_GAMMA: i32 = INT_BIAS << (GAMMA_SHIFT - BETA_SHIFT);

// decreasing radius factor, starts at 32.0 biased by 6 bits
const INIT_RAD: usize = NETSIZE >> 3;
const RADIUS_BIAS_SHIFT: i32 = 6;
const RADIUS_BIAS: i32 = 1 << RADIUS_BIAS_SHIFT;
const INIT_RADIUS: i32 = INIT_RAD as i32 * RADIUS_BIAS;
const RADIUS_DEC: i32 = 30;

// decreasing alpha factor, starts at 1.0
const ALPHA_BIAS_SHIFT: i32 = 10;
const INIT_ALPHA: i32 = 1 << ALPHA_BIAS_SHIFT;

const RAD_BIAS_SHIFT: i32 = 8;
const RAD_BIAS: i32 = 1 << RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS_SHIFT: i32 = ALPHA_BIAS_SHIFT + RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS: i32 = 1 << ALPHA_RAD_BIAS_SHIFT;

/// Pixels mapped between two interrupt checks
const MAP_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
struct Neuron {
    /// Channels in input order, fixed point while learning
    color: [i32; 3],
    /// Palette slot, recorded when the network is unbiased
    slot: usize,
}

impl Neuron {
    /// Move towards `px` by `a / scale`
    #[inline]
    fn shift(&mut self, a: i32, scale: i32, px: [i32; 3]) {
        for (c, p) in self.color.iter_mut().zip(px) {
            *c -= (a * (*c - p)) / scale;
        }
    }

    #[inline]
    fn distance(&self, px: [i32; 3]) -> i32 {
        self.color
            .iter()
            .zip(px)
            .map(|(c, p)| (c - p).abs())
            .sum()
    }
}

/// Learning state of the self-organizing map for one frame
pub struct NeuQuant<'a> {
    pixels: &'a [u8],
    samplefac: i32,
    network: Vec<Neuron>,
    freq: Vec<i32>,
    bias: Vec<i32>,
    radpower: [i32; INIT_RAD],
}

impl<'a> NeuQuant<'a> {
    /// Initialises the network along the grey diagonal.
    ///
    /// `pixels` must hold whole RGB triples; `samplefac` is raised to at least 1.
    pub fn new(pixels: &'a [u8], samplefac: i32) -> NeuQuant<'a> {
        let network = (0..NETSIZE)
            .map(|i| {
                let v = ((i as i32) << (NET_BIAS_SHIFT + 8)) / NETSIZE as i32;
                Neuron {
                    color: [v; 3],
                    slot: i,
                }
            })
            .collect();
        NeuQuant {
            pixels,
            samplefac: samplefac.max(1),
            network,
            freq: vec![INT_BIAS / NETSIZE as i32; NETSIZE],
            bias: vec![0; NETSIZE],
            radpower: [0; INIT_RAD],
        }
    }

    /// Main learning loop.
    ///
    /// The interrupt is polled before learning and each time alpha and the
    /// radius decay, so roughly a hundred times per frame.
    pub fn learn<I: Interrupt + ?Sized>(&mut self, interrupt: &I) -> Result<()> {
        if interrupt.is_interrupted() {
            return Err(EncodingError::Cancelled);
        }
        let len = self.pixels.len();
        if len < MIN_PICTURE_BYTES {
            self.samplefac = 1;
        }
        let alphadec = 30 + (self.samplefac - 1) / 3;
        let samplepixels = len / (3 * self.samplefac as usize);
        let delta = cmp::max(1, samplepixels / N_CYCLES);
        let mut alpha = INIT_ALPHA;
        let mut radius = INIT_RADIUS;
        let mut rad = radius >> RADIUS_BIAS_SHIFT;
        if rad <= 1 {
            rad = 0;
        }
        self.set_radpower(alpha, rad);

        let step = if len < MIN_PICTURE_BYTES {
            3
        } else {
            3 * [PRIME1, PRIME2, PRIME3]
                .into_iter()
                .find(|&p| len % p != 0)
                .unwrap_or(PRIME4)
        };

        let mut pix = 0;
        for i in 1..=samplepixels {
            let p = &self.pixels[pix..pix + 3];
            let px = [
                i32::from(p[0]) << NET_BIAS_SHIFT,
                i32::from(p[1]) << NET_BIAS_SHIFT,
                i32::from(p[2]) << NET_BIAS_SHIFT,
            ];
            let j = self.contest(px);
            self.network[j].shift(alpha, INIT_ALPHA, px);
            if rad != 0 {
                self.alter_neighbours(rad, j, px);
            }
            pix += step;
            if pix >= len {
                pix -= len;
            }
            if i % delta != 0 {
                continue;
            }
            if interrupt.is_interrupted() {
                return Err(EncodingError::Cancelled);
            }
            alpha -= alpha / alphadec;
            radius -= radius / RADIUS_DEC;
            rad = radius >> RADIUS_BIAS_SHIFT;
            if rad <= 1 {
                rad = 0;
            }
            self.set_radpower(alpha, rad);
        }
        Ok(())
    }

    /// Unbiases the network and builds the green-channel search index.
    pub fn build<I: Interrupt + ?Sized>(mut self, interrupt: &I) -> Result<ColorMap> {
        if interrupt.is_interrupted() {
            return Err(EncodingError::Cancelled);
        }
        for (i, n) in self.network.iter_mut().enumerate() {
            for c in n.color.iter_mut() {
                *c = (*c >> NET_BIAS_SHIFT).clamp(0, 255);
            }
            n.slot = i;
        }
        Ok(ColorMap::index(self.network))
    }

    fn set_radpower(&mut self, alpha: i32, rad: i32) {
        let rad2 = rad * rad;
        for (i, power) in self.radpower.iter_mut().enumerate().take(rad as usize) {
            let i = i as i32;
            *power = alpha * (((rad2 - i * i) * RAD_BIAS) / rad2);
        }
    }

    /// Finds the closest neuron (min dist) and updates freq, then returns the
    /// best neuron by biased distance. Frequently chosen neurons have a high
    /// freq and a negative bias.
    fn contest(&mut self, px: [i32; 3]) -> usize {
        let mut bestd = i32::MAX;
        let mut bestbiasd = i32::MAX;
        let mut bestpos = 0;
        let mut bestbiaspos = 0;
        for i in 0..NETSIZE {
            let dist = self.network[i].distance(px);
            if dist < bestd {
                bestd = dist;
                bestpos = i;
            }
            let biasdist = dist - (self.bias[i] >> (INT_BIAS_SHIFT - NET_BIAS_SHIFT));
            if biasdist < bestbiasd {
                bestbiasd = biasdist;
                bestbiaspos = i;
            }
            let betafreq = self.freq[i] >> BETA_SHIFT;
            self.freq[i] -= betafreq;
            self.bias[i] += betafreq << GAMMA_SHIFT;
        }
        self.freq[bestpos] += BETA;
        self.bias[bestpos] -= BETA_GAMMA;
        bestbiaspos
    }

    /// Moves adjacent neurons by precomputed alpha*(1-((i-j)^2/[r]^2)) in radpower[|i-j|]
    fn alter_neighbours(&mut self, rad: i32, i: usize, px: [i32; 3]) {
        let center = i as i32;
        let lo = cmp::max(center - rad, -1);
        let hi = cmp::min(center + rad, NETSIZE as i32);
        let mut j = center + 1;
        let mut k = center - 1;
        let mut m = 1;
        while j < hi || k > lo {
            let a = self.radpower[m];
            m += 1;
            if j < hi {
                self.network[j as usize].shift(a, ALPHA_RAD_BIAS, px);
                j += 1;
            }
            if k > lo {
                self.network[k as usize].shift(a, ALPHA_RAD_BIAS, px);
                k -= 1;
            }
        }
    }
}

/// A trained palette with its nearest-color search index
#[derive(Debug, Clone)]
pub struct ColorMap {
    /// Neurons sorted on the green channel
    network: Vec<Neuron>,
    netindex: [usize; 256],
}

impl ColorMap {
    /// Selection sort on green and construction of `netindex[0..255]`
    fn index(mut network: Vec<Neuron>) -> ColorMap {
        let mut netindex = [0; 256];
        let mut previouscol = 0;
        let mut startpos = 0;
        for i in 0..NETSIZE {
            let mut smallpos = i;
            let mut smallval = network[i].color[1] as usize;
            for (j, q) in network.iter().enumerate().skip(i + 1) {
                if (q.color[1] as usize) < smallval {
                    smallpos = j;
                    smallval = q.color[1] as usize;
                }
            }
            network.swap(i, smallpos);
            if smallval != previouscol {
                netindex[previouscol] = (startpos + i) >> 1;
                for slot in netindex.iter_mut().take(smallval).skip(previouscol + 1) {
                    *slot = i;
                }
                previouscol = smallval;
                startpos = i;
            }
        }
        netindex[previouscol] = (startpos + MAX_NETPOS) >> 1;
        for slot in netindex.iter_mut().skip(previouscol + 1) {
            *slot = MAX_NETPOS;
        }
        ColorMap { network, netindex }
    }

    /// The palette in slot order, three bytes per entry
    pub fn color_table(&self) -> Vec<u8> {
        let mut table = vec![0; 3 * NETSIZE];
        for n in &self.network {
            let entry = &mut table[3 * n.slot..3 * n.slot + 3];
            for (out, c) in entry.iter_mut().zip(n.color) {
                *out = c as u8;
            }
        }
        table
    }

    /// Color stored in palette slot `slot`
    pub fn lookup(&self, slot: usize) -> Option<Rgb> {
        self.network
            .iter()
            .find(|n| n.slot == slot)
            .map(|n| n.color.map(|c| c as u8))
    }

    /// Palette slot of the entry nearest to `color`.
    ///
    /// Searches outwards from `netindex[g]`, dropping a direction once the
    /// green distance alone is no better than the best total distance.
    pub fn index_of(&self, color: Rgb) -> u8 {
        let [r, g, b] = color.map(i32::from);
        let mut bestd = 1000; // biggest possible dist is 256*3
        let mut best = 0;
        let mut i = self.netindex[g as usize];
        let mut j = i as isize - 1;
        while i < NETSIZE || j >= 0 {
            if i < NETSIZE {
                let n = &self.network[i];
                let dist = n.color[1] - g;
                if dist < bestd {
                    i += 1;
                    let dist = dist.abs() + (n.color[0] - r).abs();
                    if dist < bestd {
                        let dist = dist + (n.color[2] - b).abs();
                        if dist < bestd {
                            bestd = dist;
                            best = n.slot;
                        }
                    }
                } else {
                    i = NETSIZE;
                }
            }
            if j >= 0 {
                let n = &self.network[j as usize];
                let dist = g - n.color[1];
                if dist < bestd {
                    j -= 1;
                    let dist = dist.abs() + (n.color[0] - r).abs();
                    if dist < bestd {
                        let dist = dist + (n.color[2] - b).abs();
                        if dist < bestd {
                            bestd = dist;
                            best = n.slot;
                        }
                    }
                } else {
                    j = -1;
                }
            }
        }
        best as u8
    }

    /// Maps every RGB triple of `pixels` to its palette slot.
    pub fn map_pixels<I: Interrupt + ?Sized>(&self, pixels: &[u8], interrupt: &I) -> Result<Vec<u8>> {
        let mut indices = Vec::with_capacity(pixels.len() / 3);
        for chunk in pixels.chunks(3 * MAP_CHUNK) {
            if interrupt.is_interrupted() {
                return Err(EncodingError::Cancelled);
            }
            indices.extend(
                chunk
                    .chunks_exact(3)
                    .map(|p| self.index_of([p[0], p[1], p[2]])),
            );
        }
        Ok(indices)
    }
}

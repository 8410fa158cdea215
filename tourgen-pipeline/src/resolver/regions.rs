//! Built-in country/region table and the regional-default tier
//!
//! Bounding boxes are coarse (mainland extents, no antimeridian handling); they
//! only feed country/region labelling and the last-resort centroid, never a
//! coordinate presented as precise.

use tourgen_common::geo::{BoundingBox, GeoPoint};
use tourgen_common::text::normalize_name;

use crate::types::{CandidateCoordinate, LocationQuery, SourceId};

/// Confidence of a region-level centroid
pub const REGION_CENTROID_CONFIDENCE: f64 = 0.2;

/// Confidence of a country-level centroid
pub const COUNTRY_CENTROID_CONFIDENCE: f64 = 0.1;

#[derive(Debug)]
pub struct Country {
    pub iso3: &'static str,
    pub iso2: &'static str,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub bbox: BoundingBox,
    pub centroid: GeoPoint,
}

#[derive(Debug)]
pub struct Region {
    pub country_iso3: &'static str,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub bbox: BoundingBox,
    pub centroid: GeoPoint,
}

const fn pt(lat: f64, lng: f64) -> GeoPoint {
    GeoPoint { lat, lng }
}

const fn bb(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> BoundingBox {
    BoundingBox::new(min_lat, max_lat, min_lng, max_lng)
}

static COUNTRIES: &[Country] = &[
    Country { iso3: "KOR", iso2: "KR", name: "South Korea", aliases: &["korea", "republic of korea", "대한민국", "한국"], bbox: bb(33.0, 38.7, 124.5, 131.0), centroid: pt(36.5, 127.8) },
    Country { iso3: "JPN", iso2: "JP", name: "Japan", aliases: &["日本", "일본"], bbox: bb(24.0, 45.6, 122.9, 146.0), centroid: pt(36.2, 138.25) },
    Country { iso3: "CHN", iso2: "CN", name: "China", aliases: &["中国", "중국"], bbox: bb(18.1, 53.6, 73.5, 134.8), centroid: pt(35.86, 104.19) },
    Country { iso3: "TWN", iso2: "TW", name: "Taiwan", aliases: &["台灣", "台湾", "대만"], bbox: bb(21.9, 25.3, 120.0, 122.0), centroid: pt(23.7, 121.0) },
    Country { iso3: "FRA", iso2: "FR", name: "France", aliases: &["프랑스"], bbox: bb(41.3, 51.1, -5.2, 9.6), centroid: pt(46.6, 2.4) },
    Country { iso3: "ITA", iso2: "IT", name: "Italy", aliases: &["italia", "이탈리아"], bbox: bb(36.6, 47.1, 6.6, 18.5), centroid: pt(42.8, 12.5) },
    Country { iso3: "ESP", iso2: "ES", name: "Spain", aliases: &["españa", "스페인"], bbox: bb(36.0, 43.8, -9.3, 3.3), centroid: pt(40.4, -3.7) },
    Country { iso3: "GBR", iso2: "GB", name: "United Kingdom", aliases: &["uk", "great britain", "영국"], bbox: bb(49.9, 58.7, -8.2, 1.8), centroid: pt(54.0, -2.0) },
    Country { iso3: "DEU", iso2: "DE", name: "Germany", aliases: &["deutschland", "독일"], bbox: bb(47.3, 55.1, 5.9, 15.0), centroid: pt(51.2, 10.4) },
    Country { iso3: "USA", iso2: "US", name: "United States", aliases: &["usa", "united states of america", "america", "미국"], bbox: bb(24.5, 49.4, -124.8, -66.9), centroid: pt(39.8, -98.6) },
    Country { iso3: "THA", iso2: "TH", name: "Thailand", aliases: &["태국"], bbox: bb(5.6, 20.5, 97.3, 105.6), centroid: pt(15.87, 100.99) },
    Country { iso3: "VNM", iso2: "VN", name: "Vietnam", aliases: &["viet nam", "việt nam", "베트남"], bbox: bb(8.4, 23.4, 102.1, 109.5), centroid: pt(14.06, 108.28) },
];

static REGIONS: &[Region] = &[
    Region { country_iso3: "KOR", name: "Seoul", aliases: &["서울", "서울특별시", "seoul special city"], bbox: bb(37.41, 37.72, 126.76, 127.19), centroid: pt(37.5665, 126.978) },
    Region { country_iso3: "KOR", name: "Busan", aliases: &["부산", "부산광역시"], bbox: bb(34.88, 35.39, 128.76, 129.31), centroid: pt(35.1796, 129.0756) },
    Region { country_iso3: "KOR", name: "Gyeongju", aliases: &["경주", "경주시"], bbox: bb(35.65, 36.05, 128.98, 129.5), centroid: pt(35.8562, 129.2247) },
    Region { country_iso3: "KOR", name: "Jeju", aliases: &["제주", "제주도", "jeju do", "제주특별자치도"], bbox: bb(33.1, 33.6, 126.1, 127.0), centroid: pt(33.4996, 126.5312) },
    Region { country_iso3: "KOR", name: "Incheon", aliases: &["인천", "인천광역시"], bbox: bb(37.2, 37.8, 126.3, 126.8), centroid: pt(37.4563, 126.7052) },
    Region { country_iso3: "JPN", name: "Tokyo", aliases: &["東京", "도쿄"], bbox: bb(35.5, 35.9, 138.94, 139.92), centroid: pt(35.6762, 139.6503) },
    Region { country_iso3: "JPN", name: "Kyoto", aliases: &["京都", "교토"], bbox: bb(34.87, 35.32, 135.56, 135.88), centroid: pt(35.0116, 135.7681) },
    Region { country_iso3: "JPN", name: "Osaka", aliases: &["大阪", "오사카"], bbox: bb(34.46, 34.84, 135.36, 135.68), centroid: pt(34.6937, 135.5023) },
    Region { country_iso3: "CHN", name: "Beijing", aliases: &["北京", "베이징"], bbox: bb(39.44, 41.06, 115.42, 117.51), centroid: pt(39.9042, 116.4074) },
    Region { country_iso3: "CHN", name: "Shanghai", aliases: &["上海", "상하이"], bbox: bb(30.68, 31.87, 120.85, 122.12), centroid: pt(31.2304, 121.4737) },
    Region { country_iso3: "TWN", name: "Taipei", aliases: &["台北", "臺北", "타이베이"], bbox: bb(24.96, 25.21, 121.45, 121.67), centroid: pt(25.033, 121.5654) },
    Region { country_iso3: "FRA", name: "Paris", aliases: &["île de france", "ile de france", "파리"], bbox: bb(48.12, 49.24, 1.45, 3.56), centroid: pt(48.8566, 2.3522) },
    Region { country_iso3: "FRA", name: "Provence", aliases: &["provence alpes côte d azur", "marseille", "프로방스"], bbox: bb(42.98, 45.13, 4.23, 7.72), centroid: pt(43.9352, 6.0679) },
    Region { country_iso3: "ITA", name: "Rome", aliases: &["roma", "로마"], bbox: bb(41.65, 42.15, 12.23, 12.86), centroid: pt(41.9028, 12.4964) },
    Region { country_iso3: "ITA", name: "Florence", aliases: &["firenze", "피렌체"], bbox: bb(43.72, 43.83, 11.15, 11.34), centroid: pt(43.7696, 11.2558) },
    Region { country_iso3: "ITA", name: "Venice", aliases: &["venezia", "베네치아"], bbox: bb(45.2, 45.6, 12.1, 12.6), centroid: pt(45.4408, 12.3155) },
    Region { country_iso3: "ESP", name: "Barcelona", aliases: &["바르셀로나"], bbox: bb(41.32, 41.47, 2.05, 2.23), centroid: pt(41.3874, 2.1686) },
    Region { country_iso3: "ESP", name: "Madrid", aliases: &["마드리드"], bbox: bb(40.31, 40.56, -3.89, -3.52), centroid: pt(40.4168, -3.7038) },
    Region { country_iso3: "GBR", name: "London", aliases: &["런던"], bbox: bb(51.28, 51.7, -0.51, 0.33), centroid: pt(51.5074, -0.1278) },
    Region { country_iso3: "DEU", name: "Berlin", aliases: &["베를린"], bbox: bb(52.34, 52.68, 13.09, 13.76), centroid: pt(52.52, 13.405) },
    Region { country_iso3: "USA", name: "New York", aliases: &["new york city", "nyc", "뉴욕"], bbox: bb(40.48, 40.92, -74.26, -73.7), centroid: pt(40.7128, -74.006) },
    Region { country_iso3: "THA", name: "Bangkok", aliases: &["방콕", "กรุงเทพมหานคร"], bbox: bb(13.49, 13.96, 100.33, 100.94), centroid: pt(13.7563, 100.5018) },
    Region { country_iso3: "VNM", name: "Hanoi", aliases: &["hà nội", "ha noi", "하노이"], bbox: bb(20.56, 21.39, 105.28, 106.02), centroid: pt(21.0278, 105.8342) },
];

fn area(b: &BoundingBox) -> f64 {
    (b.max_lat - b.min_lat) * (b.max_lng - b.min_lng)
}

fn matches_name(hint: &str, name: &str, aliases: &[&str]) -> bool {
    let hint = normalize_name(hint);
    !hint.is_empty()
        && (normalize_name(name) == hint || aliases.iter().any(|a| normalize_name(a) == hint))
}

/// Country by ISO alpha-3, alpha-2, English name, or alias (case/punctuation-insensitive)
pub fn find_country(hint: &str) -> Option<&'static Country> {
    let trimmed = hint.trim();
    COUNTRIES.iter().find(|c| {
        c.iso3.eq_ignore_ascii_case(trimmed)
            || c.iso2.eq_ignore_ascii_case(trimmed)
            || matches_name(trimmed, c.name, c.aliases)
    })
}

/// Region by name or alias, optionally restricted to one country
pub fn find_region(hint: &str, country: Option<&Country>) -> Option<&'static Region> {
    REGIONS.iter().find(|r| {
        country.map_or(true, |c| c.iso3 == r.country_iso3) && matches_name(hint, r.name, r.aliases)
    })
}

/// Country whose bounding box contains `point` (smallest box wins on overlap)
pub fn country_for_point(point: &GeoPoint) -> Option<&'static Country> {
    COUNTRIES
        .iter()
        .filter(|c| c.bbox.contains(point.lat, point.lng))
        .min_by(|a, b| area(&a.bbox).total_cmp(&area(&b.bbox)))
}

/// Region whose bounding box contains `point` (smallest box wins on overlap)
pub fn region_for_point(point: &GeoPoint) -> Option<&'static Region> {
    REGIONS
        .iter()
        .filter(|r| r.bbox.contains(point.lat, point.lng))
        .min_by(|a, b| area(&a.bbox).total_cmp(&area(&b.bbox)))
}

/// Normalize an ISO alpha-2/alpha-3 code to alpha-3 when the table knows it
pub fn iso3_for(code: &str) -> Option<&'static str> {
    let code = code.trim();
    COUNTRIES
        .iter()
        .find(|c| c.iso3.eq_ignore_ascii_case(code) || c.iso2.eq_ignore_ascii_case(code))
        .map(|c| c.iso3)
}

/// Last-resort tier: centroid of the hinted region or country
#[derive(Debug, Clone)]
pub struct RegionalDefault {
    source: SourceId,
}

impl RegionalDefault {
    pub const SOURCE_ID: &'static str = "regional-default";

    pub fn new() -> Self {
        Self {
            source: SourceId::from(Self::SOURCE_ID),
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Centroid candidate for the query's hints, or `None` if nothing is recognized
    ///
    /// Priority: hinted region (scoped to the hinted country when both are given),
    /// hinted country, then the raw name itself read as a region or country.
    pub fn candidate(&self, query: &LocationQuery) -> Option<CandidateCoordinate> {
        let country = query.hint_country.as_deref().and_then(find_country);

        if let Some(region) = query
            .hint_region
            .as_deref()
            .and_then(|r| find_region(r, country))
        {
            return self.region_candidate(region);
        }

        if let Some(country) = country {
            return self.country_candidate(country);
        }

        // Unrecognized explicit country hint: the caller's country is unknown to us,
        // so do not guess from the name either.
        if query.hint_country.is_some() {
            return None;
        }

        if let Some(region) = find_region(&query.raw_name, None) {
            return self.region_candidate(region);
        }
        find_country(&query.raw_name).and_then(|c| self.country_candidate(c))
    }

    fn region_candidate(&self, region: &Region) -> Option<CandidateCoordinate> {
        CandidateCoordinate::new(
            region.centroid.lat,
            region.centroid.lng,
            self.source.clone(),
            REGION_CENTROID_CONFIDENCE,
        )
        .ok()
        .map(|c| c.with_address(region.name).with_country(region.country_iso3))
    }

    fn country_candidate(&self, country: &Country) -> Option<CandidateCoordinate> {
        CandidateCoordinate::new(
            country.centroid.lat,
            country.centroid.lng,
            self.source.clone(),
            COUNTRY_CENTROID_CONFIDENCE,
        )
        .ok()
        .map(|c| c.with_address(country.name).with_country(country.iso3))
    }
}

impl Default for RegionalDefault {
    fn default() -> Self {
        Self::new()
    }
}
